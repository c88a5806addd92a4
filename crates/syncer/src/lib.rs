//! # Syncer
//!
//! Multi-stream synchronizer: assembles time-aligned framesets keyed on one
//! stream.
//!
//! Each stream gets a lane (bounded ring + front slot). A frameset holds the
//! key stream's front frame plus, for every other stream, the queued frame
//! with minimum absolute timestamp distance to it. Streams without frames are
//! omitted.
//!
//! ## Usage
//!
//! ```ignore
//! use syncer::Syncer;
//!
//! let syncer = Arc::new(Syncer::new(StreamKind::Depth.into()));
//!
//! // Delivery threads
//! syncer.enqueue(frame);
//!
//! // Consumer
//! let set = syncer.wait_for_frames(Duration::from_millis(100));
//! if let Some(depth) = set.key_frame() {
//!     // ...
//! }
//! ```

mod engine;
mod frameset;
mod lane;

#[cfg(test)]
mod test_support;

pub use frameset::FrameSet;
pub use engine::Syncer;
