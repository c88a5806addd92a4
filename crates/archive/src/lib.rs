//! # Archive
//!
//! The owner that publishes, tracks and recycles frames.
//!
//! - Fixed pool of [`ARCHIVE_CAPACITY`] frame slots
//! - Per-stream limit on published, unkept frames
//! - Data buffer freelist for allocation-free steady state
//! - `flush()`: stop allocation and drain at teardown

mod archive;

pub use archive::{FrameArchive, ARCHIVE_CAPACITY};
