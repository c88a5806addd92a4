//! Bounded frame ring with drop-oldest eviction.
//!
//! Shared by [`crate::FrameQueue`] and the syncer's per-stream lanes. Not
//! synchronized; owners wrap it in their own lock.

use std::fmt;

use frame::FrameHandle;
use ringbuf::{traits::*, HeapRb};

/// Per-stream frame ring
pub struct FrameRing {
    ring: HeapRb<FrameHandle>,
    dropped_count: u64,
    out_of_order_count: u64,
    last_timestamp: Option<f64>,
}

impl fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRing")
            .field("len", &self.ring.occupied_len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped_count)
            .finish()
    }
}

impl FrameRing {
    /// Create a ring holding at most `capacity` frames (at least one)
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            dropped_count: 0,
            out_of_order_count: 0,
            last_timestamp: None,
        }
    }

    /// Append a frame.
    ///
    /// If the ring is full the oldest frame is evicted and returned; the
    /// caller releases it, ideally outside any lock.
    #[inline]
    pub fn push(&mut self, frame: FrameHandle) -> Option<FrameHandle> {
        let timestamp = frame.timestamp();
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                self.out_of_order_count += 1;
            }
        }
        self.last_timestamp = Some(timestamp);

        let evicted = if self.ring.is_full() {
            self.dropped_count += 1;
            self.ring.try_pop()
        } else {
            None
        };

        // Cannot fail: a slot was freed above when the ring was full
        if let Err(frame) = self.ring.try_push(frame) {
            self.dropped_count += 1;
            return Some(frame);
        }
        evicted
    }

    /// Remove the oldest frame
    #[inline]
    pub fn pop(&mut self) -> Option<FrameHandle> {
        self.ring.try_pop()
    }

    /// Oldest frame without removing it
    #[inline]
    pub fn peek(&self) -> Option<&FrameHandle> {
        self.ring.iter().next()
    }

    /// Remove every frame, oldest first
    pub fn drain(&mut self) -> Vec<FrameHandle> {
        self.ring.pop_iter().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    /// Frames evicted by overflow
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Frames that arrived with a timestamp older than their predecessor
    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }
}
