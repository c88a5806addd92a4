//! FrameOwner - the recycler a frame reports back to
//!
//! Frames never point at a concrete pool. Whoever publishes them implements
//! this trait and is injected at publish time.

use std::sync::{Arc, Weak};

use contracts::{SensorInfo, StreamId};
use frame_pool::HeapItem;

use crate::{Frame, FrameCell, MetadataParserMap};

/// Frame owner (archive)
///
/// Implementations must be thread-safe: `unpublish_frame` runs on whichever
/// thread drops the last handle.
pub trait FrameOwner: Send + Sync {
    /// Move the frame into owned storage.
    ///
    /// Hands the frame back when the owner refuses it (storage exhausted,
    /// allocation stopped, or a per-stream limit reached).
    fn publish_frame(&self, frame: Frame) -> Result<HeapItem<Frame>, Frame>;

    /// Recycle a frame whose last reference was released.
    ///
    /// Called exactly once per published frame.
    fn unpublish_frame(&self, item: &mut HeapItem<Frame>);

    /// The frame was pinned; called at most once per frame
    fn keep_frame(&self, frame: &Frame);

    /// Sensor the owner produces frames for
    fn sensor(&self) -> Weak<SensorInfo>;

    /// Parser table attached to frames of `stream` at publish time
    fn parsers(&self, stream: StreamId) -> Option<Arc<MetadataParserMap>>;

    /// Empty handle cell to publish into, if the owner keeps any
    fn take_cell(&self) -> Option<FrameCell> {
        None
    }

    /// Handle cell freed by a release; the default just drops it
    fn recycle_cell(&self, cell: FrameCell) {
        drop(cell);
    }
}
