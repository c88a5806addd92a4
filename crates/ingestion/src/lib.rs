//! # Ingestion Pipeline
//!
//! Frame producers feeding the runtime.
//!
//! Responsibilities:
//! - [`StreamSource`]: one delivery thread per stream, publishing into a
//!   [`archive::FrameArchive`] and pushing into a [`frame_queue::FrameSink`]
//! - [`MockStreamSource`]: synthetic depth / image / motion frames at a
//!   configured fps, for running without a device
//! - [`IngestionPipeline`]: registration, start/stop of all sources
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::IngestionPipeline;
//!
//! let pipeline = IngestionPipeline::from_configs(&config.streams, &archive)?;
//! pipeline.start_all(syncer.clone())?;
//! // ...
//! pipeline.stop_all();
//! ```

mod config;
mod error;
mod mock;
mod pipeline;
mod source;

// Re-exports
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use mock::{gradient_value, MockStreamSource};
pub use pipeline::IngestionPipeline;
pub use source::StreamSource;
