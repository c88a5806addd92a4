use std::sync::Arc;

use archive::FrameArchive;
use contracts::{ArchiveConfig, FrameHeader, PixelFormat, SensorInfo, StreamKind, StreamProfile, TimestampDomain};
use frame::{FrameBuilder, FrameContext, FrameHandle};

pub(crate) fn test_archive() -> Arc<FrameArchive> {
    let config = ArchiveConfig {
        max_published_per_stream: 64,
        ..Default::default()
    };
    FrameArchive::new(config, FrameContext::standard(), SensorInfo::default())
}

pub(crate) fn frame_at(
    archive: &Arc<FrameArchive>,
    kind: StreamKind,
    frame_number: u64,
    timestamp: f64,
) -> FrameHandle {
    let profile = StreamProfile::motion(kind.into(), PixelFormat::Raw8, 30);
    FrameBuilder::new()
        .header(FrameHeader::new(frame_number, timestamp, TimestampDomain::HardwareClock))
        .profile(Arc::new(profile))
        .build()
        .and_then(|frame| {
            archive
                .publish(frame)
                .ok_or_else(|| contracts::FrameError::invalid_argument("archive refused frame"))
        })
        .unwrap()
}
