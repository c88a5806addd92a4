//! Per-stream lane: bounded ring plus the current front candidate.

use frame::FrameHandle;
use frame_queue::FrameRing;

/// Lane state
///
/// `front` holds the best candidate seen so far for the next frameset. It is
/// moved out when a frameset is assembled.
#[derive(Debug)]
pub(crate) struct Lane {
    ring: FrameRing,
    front: Option<FrameHandle>,
}

impl Lane {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: FrameRing::new(capacity),
            front: None,
        }
    }

    /// Queue a frame; returns the frame evicted on overflow
    #[inline]
    pub(crate) fn push(&mut self, frame: FrameHandle) -> Option<FrameHandle> {
        self.ring.push(frame)
    }

    /// Populate the front from the ring if it is empty
    #[inline]
    pub(crate) fn fill_front(&mut self) -> Option<&FrameHandle> {
        if self.front.is_none() {
            self.front = self.ring.pop();
        }
        self.front.as_ref()
    }

    /// Advance the front while the next queued frame is strictly closer to
    /// `target`. Returns the frames passed over; equal distance keeps the
    /// current front.
    pub(crate) fn advance_towards(&mut self, target: f64) -> Vec<FrameHandle> {
        let mut skipped = Vec::new();
        loop {
            let closer = match (&self.front, self.ring.peek()) {
                (Some(front), Some(next)) => {
                    (next.timestamp() - target).abs() < (front.timestamp() - target).abs()
                }
                _ => false,
            };
            if !closer {
                break;
            }
            if let Some(passed) = std::mem::replace(&mut self.front, self.ring.pop()) {
                skipped.push(passed);
            }
        }
        skipped
    }

    #[inline]
    pub(crate) fn front(&self) -> Option<&FrameHandle> {
        self.front.as_ref()
    }

    #[inline]
    pub(crate) fn take_front(&mut self) -> Option<FrameHandle> {
        FrameHandle::take(&mut self.front)
    }

    /// Whether a frame is ready to become (or already is) the front
    #[inline]
    pub(crate) fn has_frame(&self) -> bool {
        self.front.is_some() || !self.ring.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.len() + usize::from(self.front.is_some())
    }

    pub(crate) fn dropped_count(&self) -> u64 {
        self.ring.dropped_count()
    }

    /// Remove every frame held by the lane
    pub(crate) fn drain(&mut self) -> Vec<FrameHandle> {
        let mut frames: Vec<FrameHandle> = self.front.take().into_iter().collect();
        frames.extend(self.ring.drain());
        frames
    }
}
