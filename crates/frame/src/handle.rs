//! FrameHandle - counted reference to a published frame
//!
//! Every live handle is one reference. Cloning (`acquire`) adds one, dropping
//! (`release`) removes one. When the last handle goes away the frame's
//! continuation runs and the slot goes back to its owner, exactly once.
//!
//! The shared cell behind the handles is parked with the owner after release
//! ([`FrameOwner::recycle_cell`]) and refilled by the next publish, so a warm
//! owner publishes without allocating.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use frame_pool::HeapItem;
use tracing::trace;

use crate::{Frame, FrameKind, FrameOwner};

/// Published frame plus the owner that recycles it.
///
/// `owner` is `None` once the frame was returned; the cell is then empty.
struct PublishedFrame {
    item: HeapItem<Frame>,
    owner: Option<Arc<dyn FrameOwner>>,
}

impl PublishedFrame {
    /// Run the continuation and hand the slot back. Returns the owner the
    /// first time only.
    fn recycle(&mut self) -> Option<Arc<dyn FrameOwner>> {
        let owner = self.owner.take()?;
        trace!(
            frame_number = self.item.header.frame_number,
            slot = ?self.item.index(),
            "frame released"
        );
        if let Some(continuation) = self.item.on_release.take() {
            continuation.run();
        }
        owner.unpublish_frame(&mut self.item);
        Some(owner)
    }
}

impl Drop for PublishedFrame {
    fn drop(&mut self) {
        // Last two handles released concurrently: nobody saw a unique cell
        self.recycle();
    }
}

/// Empty handle cell kept by an owner between publishes
pub struct FrameCell(Arc<PublishedFrame>);

impl fmt::Debug for FrameCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCell")
            .field("refs", &Arc::strong_count(&self.0))
            .finish()
    }
}

/// Owned reference to a published [`Frame`]
///
/// Dereferences to the frame. Moving a handle moves the reference with it.
#[derive(Clone)]
pub struct FrameHandle {
    inner: Arc<PublishedFrame>,
}

impl FrameHandle {
    pub(crate) fn from_published(item: HeapItem<Frame>, owner: Arc<dyn FrameOwner>) -> Self {
        if let Some(FrameCell(mut inner)) = owner.take_cell() {
            // A cell still referenced by a releasing thread is dropped instead
            if let Some(published) = Arc::get_mut(&mut inner) {
                published.item = item;
                published.owner = Some(owner);
                return Self { inner };
            }
        }
        Self {
            inner: Arc::new(PublishedFrame {
                item,
                owner: Some(owner),
            }),
        }
    }

    /// Take an additional reference
    #[inline]
    pub fn acquire(&self) -> FrameHandle {
        self.clone()
    }

    /// Give up this reference
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Move the handle out of a container slot, leaving it empty
    #[inline]
    pub fn take(slot: &mut Option<FrameHandle>) -> Option<FrameHandle> {
        slot.take()
    }

    /// Pin the frame so the owner stops counting it against its limits.
    ///
    /// Only the first call notifies the owner. Composites pin every child.
    pub fn keep(&self) {
        let frame = self.frame();
        if frame.mark_kept() {
            if let Some(owner) = &self.inner.owner {
                owner.keep_frame(frame);
            }
            if let FrameKind::Composite(children) = &frame.kind {
                for child in children {
                    child.keep();
                }
            }
        }
    }

    /// Number of live references
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles reference the same frame
    pub fn ptr_eq(a: &FrameHandle, b: &FrameHandle) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn frame(&self) -> &Frame {
        &self.inner.item
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        if let Some(published) = Arc::get_mut(&mut self.inner) {
            if let Some(owner) = published.recycle() {
                owner.recycle_cell(FrameCell(self.inner.clone()));
            }
        }
    }
}

impl Deref for FrameHandle {
    type Target = Frame;

    #[inline]
    fn deref(&self) -> &Frame {
        self.frame()
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHandle")
            .field("stream", &self.stream())
            .field("frame_number", &self.frame_number())
            .field("timestamp", &self.timestamp())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{basic_frame, RecordingOwner};
    use crate::{FrameBuilder, FrameContinuation};
    use contracts::StreamKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_release_returns_slot_once() {
        let owner = RecordingOwner::new();
        let frame = basic_frame(StreamKind::Depth, 1, 10.0)
            .publish(owner.clone())
            .unwrap();
        assert_eq!(frame.ref_count(), 1);

        let extra = frame.acquire();
        assert_eq!(frame.ref_count(), 2);

        extra.release();
        assert!(owner.unpublished().is_empty());

        frame.release();
        assert_eq!(owner.unpublished(), vec![1]);
        assert_eq!(owner.in_use(), 0);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let owner = RecordingOwner::new();
        let frame = basic_frame(StreamKind::Color, 7, 0.0)
            .publish(owner.clone())
            .unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let local = frame.acquire();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let copy = local.acquire();
                        copy.release();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(frame.ref_count(), 1);
        drop(frame);
        assert_eq!(owner.unpublished(), vec![7]);
    }

    #[test]
    fn test_continuation_runs_before_unpublish() {
        let owner = RecordingOwner::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let observed = {
            let ran = ran.clone();
            let owner = owner.clone();
            FrameContinuation::new(move || {
                // Owner has not seen the frame yet
                assert!(owner.unpublished().is_empty());
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };

        let frame = FrameBuilder::from_frame(basic_frame(StreamKind::Depth, 3, 0.0))
            .on_release(observed)
            .build()
            .unwrap()
            .publish(owner.clone())
            .unwrap();

        drop(frame);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(owner.unpublished(), vec![3]);
    }

    #[test]
    fn test_keep_is_idempotent() {
        let owner = RecordingOwner::new();
        let frame = basic_frame(StreamKind::Depth, 5, 0.0)
            .publish(owner.clone())
            .unwrap();

        frame.keep();
        frame.keep();
        frame.acquire().keep();

        assert!(frame.is_kept());
        assert_eq!(owner.kept(), vec![5]);
    }

    #[test]
    fn test_take_moves_reference() {
        let owner = RecordingOwner::new();
        let mut slot = basic_frame(StreamKind::Depth, 9, 0.0).publish(owner.clone());

        let taken = FrameHandle::take(&mut slot).unwrap();
        assert!(slot.is_none());
        assert_eq!(taken.ref_count(), 1);
        assert!(FrameHandle::take(&mut slot).is_none());
    }

    #[test]
    fn test_refused_publish_runs_continuation() {
        let owner = RecordingOwner::with_capacity_limit(0);
        let ran = Arc::new(AtomicUsize::new(0));
        let continuation = {
            let ran = ran.clone();
            FrameContinuation::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };

        let refused = FrameBuilder::from_frame(basic_frame(StreamKind::Depth, 1, 0.0))
            .on_release(continuation)
            .build()
            .unwrap()
            .publish(owner.clone());

        assert!(refused.is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_released_cell_is_reused() {
        let owner = RecordingOwner::pooling();
        let first = basic_frame(StreamKind::Gyro, 1, 0.0)
            .publish(owner.clone())
            .unwrap();
        let first_cell = Arc::as_ptr(&first.inner);
        drop(first);
        assert_eq!(owner.pooled_cells(), 1);

        let second = basic_frame(StreamKind::Gyro, 2, 1.0)
            .publish(owner.clone())
            .unwrap();
        assert_eq!(owner.pooled_cells(), 0);
        assert!(std::ptr::eq(Arc::as_ptr(&second.inner), first_cell));
        assert_eq!(second.frame_number(), 2);
        assert_eq!(second.ref_count(), 1);
        assert!(!second.is_kept());

        drop(second);
        assert_eq!(owner.unpublished(), vec![1, 2]);
        assert_eq!(owner.in_use(), 0);
    }

    #[test]
    fn test_shared_cell_is_not_reused_while_referenced() {
        let owner = RecordingOwner::pooling();
        let frame = basic_frame(StreamKind::Gyro, 1, 0.0)
            .publish(owner.clone())
            .unwrap();
        let copy = frame.acquire();

        drop(frame);
        assert_eq!(owner.pooled_cells(), 0);
        assert!(owner.unpublished().is_empty());

        drop(copy);
        assert_eq!(owner.pooled_cells(), 1);
        assert_eq!(owner.unpublished(), vec![1]);
    }
}
