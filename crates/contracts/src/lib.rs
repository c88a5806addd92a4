//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures.
//! All runtime crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Frame timestamps are `f64` milliseconds in a [`TimestampDomain`]
//! - Timestamps are only comparable within one domain
//! - `frame_number` is monotonic per stream

mod config;
mod error;
mod header;
mod metadata;
mod profile;
mod stream;

pub use config::*;
pub use error::*;
pub use header::{host_time_ms, FrameHeader};
pub use metadata::*;
pub use profile::*;
pub use stream::{StreamId, StreamKind};
