//! FrameSet - time-aligned output of the syncer

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::StreamId;
use frame::{FrameBuilder, FrameHandle, FrameOwner};

/// At most one frame per stream, ordered by stream id
///
/// Empty when no key frame was available.
#[derive(Debug)]
pub struct FrameSet {
    key_stream: StreamId,
    frames: BTreeMap<StreamId, FrameHandle>,
}

impl FrameSet {
    pub(crate) fn empty(key_stream: StreamId) -> Self {
        Self {
            key_stream,
            frames: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, stream: StreamId, frame: FrameHandle) {
        self.frames.insert(stream, frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn key_stream(&self) -> StreamId {
        self.key_stream
    }

    pub fn key_frame(&self) -> Option<&FrameHandle> {
        self.frames.get(&self.key_stream)
    }

    /// Timestamp of the key frame
    pub fn key_timestamp(&self) -> Option<f64> {
        self.key_frame().map(|f| f.timestamp())
    }

    pub fn get(&self, stream: StreamId) -> Option<&FrameHandle> {
        self.frames.get(&stream)
    }

    pub fn contains(&self, stream: StreamId) -> bool {
        self.frames.contains_key(&stream)
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.frames.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &FrameHandle)> + '_ {
        self.frames.iter().map(|(stream, frame)| (*stream, frame))
    }

    /// |timestamp - key timestamp| for every non-key frame
    pub fn alignment_errors(&self) -> impl Iterator<Item = (StreamId, f64)> + '_ {
        let key_ts = self.key_timestamp();
        self.iter()
            .filter(move |(stream, _)| *stream != self.key_stream)
            .filter_map(move |(stream, frame)| key_ts.map(|t| (stream, frame.header().distance_to(t))))
    }

    /// Frames in stream order, ownership to the caller
    pub fn into_frames(self) -> Vec<FrameHandle> {
        self.frames.into_values().collect()
    }

    /// Wrap the set in one composite frame published to `owner`.
    ///
    /// The key frame comes first so the composite reports its header.
    pub fn into_composite(self, owner: Arc<dyn FrameOwner>) -> Option<FrameHandle> {
        if self.is_empty() {
            return None;
        }
        let key_stream = self.key_stream;
        let mut frames: Vec<(StreamId, FrameHandle)> = self.frames.into_iter().collect();
        frames.sort_by_key(|(stream, _)| *stream != key_stream);
        let children: Vec<FrameHandle> = frames.into_iter().map(|(_, frame)| frame).collect();

        FrameBuilder::new()
            .composite(&children)
            .build()
            .ok()?
            .publish(owner)
    }
}

impl IntoIterator for FrameSet {
    type Item = FrameHandle;
    type IntoIter = std::collections::btree_map::IntoValues<StreamId, FrameHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_values()
    }
}
