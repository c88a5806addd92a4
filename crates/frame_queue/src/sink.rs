//! FrameSink - anything frames can be pushed into

use frame::FrameHandle;

/// Destination for produced frames
///
/// Implemented by [`crate::FrameQueue`], the syncer, and any
/// `Fn(FrameHandle)` closure.
pub trait FrameSink: Send + Sync {
    /// Take ownership of a frame; must not block on the consumer
    fn enqueue(&self, frame: FrameHandle);
}

impl<F> FrameSink for F
where
    F: Fn(FrameHandle) + Send + Sync,
{
    fn enqueue(&self, frame: FrameHandle) {
        self(frame)
    }
}
