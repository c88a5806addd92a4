//! # Frame Queue
//!
//! Bounded, thread-safe frame handoff between delivery and consumer threads.
//!
//! - [`FrameRing`]: unsynchronized drop-oldest ring
//! - [`FrameQueue`]: ring + lock + condvar, with blocking waits
//! - [`FrameSink`]: the enqueue-shaped interface producers write to

mod queue;
mod ring;
mod sink;

#[cfg(test)]
mod test_support;

pub use queue::FrameQueue;
pub use ring::FrameRing;
pub use sink::FrameSink;
