//! Frame - the owned unit of sensor output
//!
//! A `Frame` is plain data until it is published. Publishing moves it into a
//! slot owned by a [`FrameOwner`] and yields a [`FrameHandle`]; from then on
//! the frame is shared and read-only apart from the sticky `kept` flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use contracts::{
    FrameError, FrameHeader, MetadataAttribute, MetadataBlob, MetadataValue, PixelFormat,
    SensorInfo, StreamId, StreamProfile, TimestampDomain,
};
use tracing::trace;

use crate::{FrameHandle, FrameOwner, MetadataParserMap};

/// Callback run when a published frame reaches zero references.
///
/// `data` is storage owned by an external provider; while the continuation is
/// attached it is what [`Frame::data`] exposes.
pub struct FrameContinuation {
    data: Option<Bytes>,
    callback: Box<dyn FnOnce() + Send + Sync>,
}

impl FrameContinuation {
    pub fn new(callback: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            data: None,
            callback: Box::new(callback),
        }
    }

    /// Continuation that also lends externally-owned data to the frame
    pub fn with_data(data: Bytes, callback: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            data: Some(data),
            callback: Box::new(callback),
        }
    }

    pub(crate) fn run(self) {
        (self.callback)();
    }
}

impl fmt::Debug for FrameContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameContinuation")
            .field("data_len", &self.data.as_ref().map(Bytes::len))
            .finish_non_exhaustive()
    }
}

/// Image geometry of a video frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Bits per pixel
    pub bpp: u32,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, stride: u32, bpp: u32) -> Self {
        Self {
            width,
            height,
            stride,
            bpp,
        }
    }

    /// Geometry for tightly packed rows
    pub fn packed(width: u32, height: u32, bpp: u32) -> Self {
        Self::new(width, height, width * bpp / 8, bpp)
    }
}

/// Depth frame extras
#[derive(Debug, Clone)]
pub struct DepthInfo {
    pub video: VideoInfo,
    /// Meters per depth unit
    pub depth_units: f32,
    /// Frame this one was derived from (e.g. before colorizing)
    pub original: Option<FrameHandle>,
}

/// Concrete frame flavour
#[derive(Debug, Clone, Default)]
pub enum FrameKind {
    #[default]
    Basic,
    Video(VideoInfo),
    Depth(DepthInfo),
    Motion,
    /// Children held by the composite's own references
    Composite(Vec<FrameHandle>),
}

/// Frame
///
/// `Default` yields an empty basic frame; pool slots start out that way.
#[derive(Default)]
pub struct Frame {
    pub(crate) header: FrameHeader,
    pub(crate) data: Bytes,
    pub(crate) on_release: Option<FrameContinuation>,
    pub(crate) metadata: MetadataBlob,
    pub(crate) profile: Option<Arc<StreamProfile>>,
    pub(crate) parsers: Option<Arc<MetadataParserMap>>,
    pub(crate) sensor: Weak<SensorInfo>,
    pub(crate) kept: AtomicBool,
    pub(crate) fixed: bool,
    pub(crate) kind: FrameKind,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header)
            .field("data_len", &self.data.len())
            .field("stream", &self.stream())
            .field("kept", &self.is_kept())
            .field("fixed", &self.fixed)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Publish the frame to its owner.
    ///
    /// Attaches the owner's parser table and sensor when the producer did not
    /// set them, then hands the frame over. Returns `None` when the owner
    /// refuses it; a refused frame's continuation runs immediately.
    pub fn publish(mut self, owner: Arc<dyn FrameOwner>) -> Option<FrameHandle> {
        if self.parsers.is_none() {
            self.parsers = self.own_stream().and_then(|stream| owner.parsers(stream));
        }
        if self.sensor.strong_count() == 0 {
            self.sensor = owner.sensor();
        }

        match owner.publish_frame(self) {
            Ok(item) => Some(FrameHandle::from_published(item, owner)),
            Err(mut refused) => {
                trace!(frame_number = refused.header.frame_number, "publish refused");
                if let Some(continuation) = refused.on_release.take() {
                    continuation.run();
                }
                None
            }
        }
    }

    // ===== Header =====

    /// Header, borrowed from the first child for composites
    pub fn header(&self) -> FrameHeader {
        match self.first_embedded() {
            Some(first) => first.header(),
            None => self.header,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.header().timestamp
    }

    pub fn timestamp_domain(&self) -> TimestampDomain {
        self.header().timestamp_domain
    }

    pub fn frame_number(&self) -> u64 {
        self.header().frame_number
    }

    pub fn system_time(&self) -> f64 {
        self.header().system_time
    }

    pub fn backend_time(&self) -> f64 {
        self.header().backend_time
    }

    // ===== Data =====

    /// Frame bytes; external continuation data takes precedence
    pub fn data(&self) -> &[u8] {
        self.on_release
            .as_ref()
            .and_then(|c| c.data.as_deref())
            .unwrap_or(&self.data[..])
    }

    pub fn data_size(&self) -> usize {
        self.data().len()
    }

    /// Detach the owned buffer (used by owners recycling storage)
    pub fn take_data(&mut self) -> Bytes {
        std::mem::take(&mut self.data)
    }

    // ===== Profile / Stream =====

    pub fn profile(&self) -> Option<&Arc<StreamProfile>> {
        match self.first_embedded() {
            Some(first) => first.profile(),
            None => self.profile.as_ref(),
        }
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.profile().map(|p| p.stream)
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.profile().map(|p| p.format)
    }

    /// Producing sensor, if it is still alive
    pub fn sensor(&self) -> Option<Arc<SensorInfo>> {
        match self.first_embedded() {
            Some(first) => first.sensor(),
            None => self.sensor.upgrade(),
        }
    }

    fn own_stream(&self) -> Option<StreamId> {
        self.profile.as_ref().map(|p| p.stream)
    }

    // ===== Flags =====

    pub fn is_kept(&self) -> bool {
        self.kept.load(Ordering::Acquire)
    }

    /// Set the sticky kept flag; true only for the call that set it
    pub fn mark_kept(&self) -> bool {
        !self.kept.swap(true, Ordering::AcqRel)
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    // ===== Kind =====

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, FrameKind::Composite(_))
    }

    pub fn video(&self) -> Option<&VideoInfo> {
        match &self.kind {
            FrameKind::Video(video) => Some(video),
            FrameKind::Depth(depth) => Some(&depth.video),
            _ => None,
        }
    }

    pub fn embedded_frames(&self) -> &[FrameHandle] {
        match &self.kind {
            FrameKind::Composite(children) => children,
            _ => &[],
        }
    }

    pub fn embedded_count(&self) -> usize {
        self.embedded_frames().len()
    }

    fn first_embedded(&self) -> Option<&FrameHandle> {
        self.embedded_frames().first()
    }

    // ===== Metadata =====

    /// Raw metadata blob, borrowed from the first child for composites
    pub fn metadata(&self) -> &MetadataBlob {
        match self.first_embedded() {
            Some(first) => first.metadata(),
            None => &self.metadata,
        }
    }

    /// Parser table attached at publish time
    pub fn parsers(&self) -> Option<&Arc<MetadataParserMap>> {
        self.parsers.as_ref()
    }

    /// Look up a metadata attribute.
    ///
    /// # Errors
    /// - `MetadataUnavailable` when no parser table is attached
    /// - `MetadataNotApplicable` when no registered parser can serve it
    pub fn get_frame_metadata(
        &self,
        attribute: MetadataAttribute,
    ) -> Result<MetadataValue, FrameError> {
        if let Some(first) = self.first_embedded() {
            return first.get_frame_metadata(attribute);
        }
        let parsers = self
            .parsers
            .as_ref()
            .ok_or_else(|| FrameError::metadata_unavailable(self.stream()))?;
        parsers.get(attribute, self)
    }

    /// Whether any registered parser supports the attribute for this frame
    ///
    /// # Errors
    /// `MetadataUnavailable` when no parser table is attached.
    pub fn supports_frame_metadata(&self, attribute: MetadataAttribute) -> Result<bool, FrameError> {
        if let Some(first) = self.first_embedded() {
            return first.supports_frame_metadata(attribute);
        }
        let parsers = self
            .parsers
            .as_ref()
            .ok_or_else(|| FrameError::metadata_unavailable(self.stream()))?;
        Ok(parsers.supports(attribute, self))
    }

    // ===== Depth =====

    /// Distance in meters at pixel `(x, y)`.
    ///
    /// Non-`Z16` depth frames derived from another frame forward the query
    /// to that original.
    ///
    /// # Errors
    /// `InvalidArgument` for non-depth frames, out-of-range pixels and pixel
    /// widths other than 8/16/32/64 bits.
    pub fn get_distance(&self, x: u32, y: u32) -> Result<f32, FrameError> {
        let FrameKind::Depth(depth) = &self.kind else {
            return Err(FrameError::invalid_argument("not a depth frame"));
        };

        if self.format() != Some(PixelFormat::Z16) {
            if let Some(original) = &depth.original {
                return original.get_distance(x, y);
            }
        }

        let video = &depth.video;
        if x >= video.width || y >= video.height {
            return Err(FrameError::invalid_argument(format!(
                "pixel ({x}, {y}) outside {}x{} frame",
                video.width, video.height
            )));
        }

        let width = (video.bpp / 8) as usize;
        let offset = y as usize * video.stride as usize + x as usize * width;
        let data = self.data();
        let pixel = data.get(offset..offset + width).ok_or_else(|| {
            FrameError::invalid_argument(format!(
                "pixel ({x}, {y}) beyond {} byte buffer",
                data.len()
            ))
        })?;

        let raw = match width {
            1 => pixel[0] as f32,
            2 => u16::from_le(bytemuck::pod_read_unaligned(pixel)) as f32,
            4 => u32::from_le(bytemuck::pod_read_unaligned(pixel)) as f32,
            8 => u64::from_le(bytemuck::pod_read_unaligned(pixel)) as f32,
            _ => {
                return Err(FrameError::invalid_argument(format!(
                    "unsupported depth pixel width: {} bits",
                    video.bpp
                )))
            }
        };
        Ok(raw * depth.depth_units)
    }
}
