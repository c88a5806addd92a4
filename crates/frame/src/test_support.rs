//! Owners and frame factories shared by the unit tests

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use contracts::{
    FrameHeader, PixelFormat, SensorInfo, StreamId, StreamKind, StreamProfile, TimestampDomain,
};
use frame_pool::{HeapItem, SmallHeap};

use crate::{
    Frame, FrameBuilder, FrameCell, FrameContext, FrameHandle, FrameOwner, MetadataParserMap,
    VideoInfo,
};

/// Owner that records every keep / unpublish notification by frame number
pub(crate) struct RecordingOwner {
    heap: SmallHeap<Frame, 32>,
    limit: usize,
    context: Option<Arc<FrameContext>>,
    sensor: Arc<SensorInfo>,
    kept: Mutex<Vec<u64>>,
    unpublished: Mutex<Vec<u64>>,
    /// `None` when the owner does not pool handle cells
    cells: Option<Mutex<Vec<FrameCell>>>,
}

impl RecordingOwner {
    pub(crate) fn new() -> Arc<Self> {
        Self::build(usize::MAX, Some(FrameContext::standard()))
    }

    pub(crate) fn with_capacity_limit(limit: usize) -> Arc<Self> {
        Self::build(limit, Some(FrameContext::standard()))
    }

    pub(crate) fn without_parsers() -> Arc<Self> {
        Self::build(usize::MAX, None)
    }

    pub(crate) fn pooling() -> Arc<Self> {
        let mut owner = Self::build(usize::MAX, Some(FrameContext::standard()));
        if let Some(owner) = Arc::get_mut(&mut owner) {
            owner.cells = Some(Mutex::new(Vec::new()));
        }
        owner
    }

    fn build(limit: usize, context: Option<Arc<FrameContext>>) -> Arc<Self> {
        Arc::new(Self {
            heap: SmallHeap::with_name("test"),
            limit,
            context,
            sensor: Arc::new(SensorInfo {
                name: "Stereo Module".to_string(),
                serial: "000001".to_string(),
            }),
            kept: Mutex::new(Vec::new()),
            unpublished: Mutex::new(Vec::new()),
            cells: None,
        })
    }

    pub(crate) fn kept(&self) -> Vec<u64> {
        self.kept.lock().unwrap().clone()
    }

    pub(crate) fn unpublished(&self) -> Vec<u64> {
        self.unpublished.lock().unwrap().clone()
    }

    pub(crate) fn in_use(&self) -> usize {
        self.heap.size()
    }

    pub(crate) fn pooled_cells(&self) -> usize {
        self.cells.as_ref().map_or(0, |cells| cells.lock().unwrap().len())
    }
}

impl FrameOwner for RecordingOwner {
    fn publish_frame(&self, frame: Frame) -> Result<HeapItem<Frame>, Frame> {
        if self.heap.size() >= self.limit {
            return Err(frame);
        }
        match self.heap.allocate() {
            Some(mut item) => {
                *item = frame;
                Ok(item)
            }
            None => Err(frame),
        }
    }

    fn unpublish_frame(&self, item: &mut HeapItem<Frame>) {
        self.unpublished
            .lock()
            .unwrap()
            .push(item.header.frame_number);
        self.heap.deallocate(item).expect("slot from this heap");
    }

    fn keep_frame(&self, frame: &Frame) {
        self.kept.lock().unwrap().push(frame.header.frame_number);
    }

    fn sensor(&self) -> Weak<SensorInfo> {
        Arc::downgrade(&self.sensor)
    }

    fn parsers(&self, stream: StreamId) -> Option<Arc<MetadataParserMap>> {
        self.context.as_ref()?.parsers_for(stream.kind)
    }

    fn take_cell(&self) -> Option<FrameCell> {
        self.cells.as_ref()?.lock().unwrap().pop()
    }

    fn recycle_cell(&self, cell: FrameCell) {
        if let Some(cells) = &self.cells {
            cells.lock().unwrap().push(cell);
        }
    }
}

/// Unpublished basic frame on `kind`
pub(crate) fn basic_frame(kind: StreamKind, frame_number: u64, timestamp: f64) -> Frame {
    let profile = StreamProfile::motion(kind.into(), PixelFormat::Raw8, 30);
    FrameBuilder::new()
        .header(FrameHeader::new(
            frame_number,
            timestamp,
            TimestampDomain::HardwareClock,
        ))
        .profile(Arc::new(profile))
        .build()
        .unwrap()
}

/// Unpublished Z16 depth frame with tightly packed little-endian pixels
pub(crate) fn depth_frame(
    width: u32,
    height: u32,
    values: &[u16],
    depth_units: f32,
    original: Option<FrameHandle>,
) -> Frame {
    let profile = StreamProfile::video(StreamKind::Depth.into(), PixelFormat::Z16, 30, width, height);
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    FrameBuilder::new()
        .profile(Arc::new(profile))
        .data(Bytes::from(data))
        .depth(VideoInfo::packed(width, height, 16), depth_units, original)
        .build()
        .unwrap()
}
