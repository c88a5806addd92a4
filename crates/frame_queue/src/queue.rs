//! FrameQueue - bounded cross-thread frame handoff
//!
//! Producers never block: a full queue evicts its oldest frame. Consumers
//! poll or wait with a timeout.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{FrameError, QueueConfig};
use frame::FrameHandle;
use tracing::{debug, trace};

use crate::{FrameRing, FrameSink};

/// Bounded FIFO of owned frames
pub struct FrameQueue {
    ring: Mutex<FrameRing>,
    available: Condvar,
    keep_frames: bool,
}

impl fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameQueue")
            .field("ring", &*self.lock())
            .field("keep_frames", &self.keep_frames)
            .finish()
    }
}

impl FrameQueue {
    /// Queue holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self::with_config(&QueueConfig {
            capacity,
            keep_frames: false,
        })
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self {
            ring: Mutex::new(FrameRing::new(config.capacity)),
            available: Condvar::new(),
            keep_frames: config.keep_frames,
        }
    }

    /// Take ownership of a frame, releasing the oldest one when full.
    ///
    /// Never blocks on the consumer.
    pub fn enqueue(&self, frame: FrameHandle) {
        if self.keep_frames {
            frame.keep();
        }

        let evicted = self.lock().push(frame);
        self.available.notify_one();

        if let Some(old) = evicted {
            metrics::counter!("frame_queue_dropped_total").increment(1);
            debug!(
                stream = ?old.stream(),
                frame_number = old.frame_number(),
                "queue full, dropped oldest frame"
            );
            // Released here, outside the lock
            drop(old);
        }
    }

    /// Block until a frame is available.
    ///
    /// # Errors
    /// `Timeout` when no frame arrived within `timeout`.
    pub fn wait_for_frame(&self, timeout: Duration) -> Result<FrameHandle, FrameError> {
        let started = Instant::now();
        let guard = self.lock();
        let (mut ring, _) = self
            .available
            .wait_timeout_while(guard, timeout, |ring| ring.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        ring.pop().ok_or_else(|| {
            trace!(waited_ms = started.elapsed().as_millis() as u64, "wait_for_frame timed out");
            FrameError::timeout(started.elapsed())
        })
    }

    /// Like [`Self::wait_for_frame`], unwrapping a composite into its children
    pub fn wait_for_frames(&self, timeout: Duration) -> Result<Vec<FrameHandle>, FrameError> {
        let frame = self.wait_for_frame(timeout)?;
        if frame.is_composite() {
            Ok(frame.embedded_frames().iter().map(FrameHandle::acquire).collect())
        } else {
            Ok(vec![frame])
        }
    }

    /// Dequeue without blocking
    pub fn poll_for_frame(&self) -> Option<FrameHandle> {
        self.lock().pop()
    }

    /// Release every queued frame
    pub fn flush(&self) {
        let drained = self.lock().drain();
        if !drained.is_empty() {
            debug!(count = drained.len(), "flushed frame queue");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Frames dropped because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped_count()
    }

    fn lock(&self) -> MutexGuard<'_, FrameRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSink for FrameQueue {
    fn enqueue(&self, frame: FrameHandle) {
        FrameQueue::enqueue(self, frame);
    }
}

impl Drop for FrameQueue {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{frame_at, test_archive};
    use contracts::StreamKind;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_overflow_keeps_newest() {
        let archive = test_archive();
        let queue = FrameQueue::new(4);

        for n in 1..=5 {
            queue.enqueue(frame_at(&archive, StreamKind::Depth, n, n as f64));
        }

        // Frame 1 was released on overflow
        assert_eq!(archive.in_use(), 4);
        assert_eq!(queue.dropped_count(), 1);

        let numbers: Vec<u64> = std::iter::from_fn(|| queue.poll_for_frame())
            .map(|f| f.frame_number())
            .collect();
        assert_eq!(numbers, vec![2, 3, 4, 5]);
        assert_eq!(archive.in_use(), 0);
    }

    #[test]
    fn test_fifo_without_overflow() {
        let archive = test_archive();
        let queue = FrameQueue::new(8);
        for n in [10, 11, 12] {
            queue.enqueue(frame_at(&archive, StreamKind::Color, n, 0.0));
        }

        assert_eq!(queue.poll_for_frame().unwrap().frame_number(), 10);
        assert_eq!(queue.poll_for_frame().unwrap().frame_number(), 11);
        assert_eq!(queue.poll_for_frame().unwrap().frame_number(), 12);
        assert!(queue.poll_for_frame().is_none());
    }

    #[test]
    fn test_wait_times_out() {
        let queue = FrameQueue::new(1);
        let err = queue
            .wait_for_frame(Duration::from_millis(20))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_wait_wakes_on_enqueue() {
        let archive = test_archive();
        let queue = Arc::new(FrameQueue::new(2));

        let producer = {
            let queue = queue.clone();
            let archive = archive.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.enqueue(frame_at(&archive, StreamKind::Depth, 7, 7.0));
            })
        };

        let frame = queue.wait_for_frame(Duration::from_secs(5)).unwrap();
        assert_eq!(frame.frame_number(), 7);
        producer.join().unwrap();
    }

    #[test]
    fn test_flush_and_drop_release_frames() {
        let archive = test_archive();
        let queue = FrameQueue::new(4);
        queue.enqueue(frame_at(&archive, StreamKind::Depth, 1, 1.0));
        queue.enqueue(frame_at(&archive, StreamKind::Depth, 2, 2.0));

        queue.flush();
        assert!(queue.is_empty());
        assert_eq!(archive.in_use(), 0);

        queue.enqueue(frame_at(&archive, StreamKind::Depth, 3, 3.0));
        drop(queue);
        assert_eq!(archive.in_use(), 0);
    }

    #[test]
    fn test_keep_frames_pins_everything() {
        let archive = test_archive();
        let queue = FrameQueue::with_config(&QueueConfig {
            capacity: 2,
            keep_frames: true,
        });

        queue.enqueue(frame_at(&archive, StreamKind::Depth, 1, 1.0));
        assert!(queue.poll_for_frame().unwrap().is_kept());
    }

    #[test]
    fn test_wait_for_frames_unwraps_composite() {
        let archive = test_archive();
        let depth = frame_at(&archive, StreamKind::Depth, 1, 1.0);
        let color = frame_at(&archive, StreamKind::Color, 2, 1.0);
        let set = frame::FrameBuilder::new()
            .composite(&[depth, color])
            .build()
            .unwrap()
            .publish(archive.clone())
            .unwrap();

        let queue = FrameQueue::new(1);
        queue.enqueue(set);

        let frames = queue.wait_for_frames(Duration::from_millis(50)).unwrap();
        let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number()).collect();
        assert_eq!(numbers, vec![1, 2]);

        drop(frames);
        assert_eq!(archive.in_use(), 0);
    }
}
