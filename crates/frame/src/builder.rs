//! FrameBuilder - assembles a frame before publish

use std::sync::{Arc, Weak};

use bytes::Bytes;
use contracts::{FrameError, FrameHeader, MetadataAttribute, MetadataValue, SensorInfo, StreamProfile};

use crate::{
    DepthInfo, Frame, FrameContinuation, FrameHandle, FrameKind, MetadataParserMap, VideoInfo,
};

/// Frame builder
///
/// Setters never fail; the first metadata error is reported by `build()`.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    frame: Frame,
    error: Option<FrameError>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue building from an existing frame
    pub fn from_frame(frame: Frame) -> Self {
        Self { frame, error: None }
    }

    pub fn header(mut self, header: FrameHeader) -> Self {
        self.frame.header = header;
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.frame.data = data.into();
        self
    }

    pub fn profile(mut self, profile: Arc<StreamProfile>) -> Self {
        self.frame.profile = Some(profile);
        self
    }

    pub fn sensor(mut self, sensor: Weak<SensorInfo>) -> Self {
        self.frame.sensor = sensor;
        self
    }

    /// Attach a parser table explicitly instead of the owner's
    pub fn parsers(mut self, parsers: Arc<MetadataParserMap>) -> Self {
        self.frame.parsers = Some(parsers);
        self
    }

    pub fn metadata(mut self, attribute: MetadataAttribute, value: MetadataValue) -> Self {
        if let Err(e) = self.frame.metadata.insert(attribute, value) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn on_release(mut self, continuation: FrameContinuation) -> Self {
        self.frame.on_release = Some(continuation);
        self
    }

    /// Storage that must not be recycled by the owner
    pub fn fixed(mut self, fixed: bool) -> Self {
        self.frame.fixed = fixed;
        self
    }

    pub fn video(mut self, video: VideoInfo) -> Self {
        self.frame.kind = FrameKind::Video(video);
        self
    }

    pub fn depth(mut self, video: VideoInfo, depth_units: f32, original: Option<FrameHandle>) -> Self {
        self.frame.kind = FrameKind::Depth(DepthInfo {
            video,
            depth_units,
            original,
        });
        self
    }

    pub fn motion(mut self) -> Self {
        self.frame.kind = FrameKind::Motion;
        self
    }

    /// Composite of `children`; the composite takes its own reference to each
    pub fn composite(mut self, children: &[FrameHandle]) -> Self {
        self.frame.kind = FrameKind::Composite(children.iter().map(FrameHandle::acquire).collect());
        self
    }

    /// # Errors
    /// `InvalidArgument` when the metadata blob overflowed, or a composite
    /// has no children.
    pub fn build(self) -> Result<Frame, FrameError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if let FrameKind::Composite(children) = &self.frame.kind {
            if children.is_empty() {
                return Err(FrameError::invalid_argument("composite frame without children"));
            }
        }
        Ok(self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{basic_frame, RecordingOwner};
    use contracts::{ErrorKind, StreamKind};

    #[test]
    fn test_builder_sets_fields() {
        let header = FrameHeader::new(42, 1.5, contracts::TimestampDomain::SystemTime);
        let frame = FrameBuilder::new()
            .header(header)
            .data(vec![1u8, 2, 3])
            .metadata(MetadataAttribute::GainLevel, 7)
            .fixed(true)
            .motion()
            .build()
            .unwrap();

        assert_eq!(frame.frame_number(), 42);
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert_eq!(frame.metadata().get(MetadataAttribute::GainLevel), Some(7));
        assert!(frame.is_fixed());
        assert!(matches!(frame.kind(), FrameKind::Motion));
    }

    #[test]
    fn test_empty_composite_rejected() {
        let err = FrameBuilder::new().composite(&[]).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_composite_impersonates_first_child() {
        let owner = RecordingOwner::new();
        let depth = basic_frame(StreamKind::Depth, 11, 100.0)
            .publish(owner.clone())
            .unwrap();
        let color = basic_frame(StreamKind::Color, 12, 101.0)
            .publish(owner.clone())
            .unwrap();

        let set = FrameBuilder::new()
            .composite(&[depth.acquire(), color.acquire()])
            .build()
            .unwrap()
            .publish(owner.clone())
            .unwrap();

        assert_eq!(set.embedded_count(), 2);
        assert_eq!(set.frame_number(), 11);
        assert_eq!(set.timestamp(), 100.0);
        assert_eq!(set.stream(), Some(StreamKind::Depth.into()));
        assert_eq!(
            set.get_frame_metadata(MetadataAttribute::FrameCounter)
                .unwrap(),
            11
        );
    }

    #[test]
    fn test_composite_keep_propagates_once() {
        let owner = RecordingOwner::new();
        let children: Vec<_> = (1..=3)
            .map(|n| {
                basic_frame(StreamKind::Infrared, n, n as f64)
                    .publish(owner.clone())
                    .unwrap()
            })
            .collect();

        let composite = FrameBuilder::new()
            .composite(&children)
            .build()
            .unwrap()
            .publish(owner.clone())
            .unwrap();

        composite.keep();
        composite.keep();

        let mut kept = owner.kept();
        kept.sort_unstable();
        // Frame number 0 is the composite itself
        assert_eq!(kept, vec![0, 1, 2, 3]);
        assert!(children.iter().all(|c| c.is_kept()));
    }

    #[test]
    fn test_composite_release_leaves_producer_references() {
        let owner = RecordingOwner::new();
        let child = basic_frame(StreamKind::Depth, 1, 0.0)
            .publish(owner.clone())
            .unwrap();

        let composite = FrameBuilder::new()
            .composite(std::slice::from_ref(&child))
            .build()
            .unwrap()
            .publish(owner.clone())
            .unwrap();
        assert_eq!(child.ref_count(), 2);

        composite.release();
        assert_eq!(child.ref_count(), 1);
        assert_eq!(owner.in_use(), 1);

        child.release();
        assert_eq!(owner.in_use(), 0);
    }
}
