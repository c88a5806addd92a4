//! Runtime configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{PixelFormat, StreamId, StreamKind};

/// Default capacity of a syncer lane
pub const DEFAULT_LANE_CAPACITY: usize = 4;

/// Default drain bound for `wait_until_empty` (seconds)
pub const DEFAULT_DRAIN_TIMEOUT_S: u64 = 3600;

/// Top-level SDK configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SdkConfig {
    /// Archive (frame owner) settings
    #[serde(default)]
    #[validate(nested)]
    pub archive: ArchiveConfig,

    /// Consumer-facing frame queue settings
    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,

    /// Synchronizer settings
    #[serde(default)]
    #[validate(nested)]
    pub syncer: SyncerConfig,

    /// Streams to produce (mock sources in the CLI)
    #[serde(default)]
    #[validate(nested)]
    pub streams: Vec<StreamConfig>,
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ArchiveConfig {
    /// Maximum published, not kept, frames per stream.
    ///
    /// The default covers a full lane, its front slot and a 16-deep queue.
    #[validate(range(min = 1))]
    pub max_published_per_stream: usize,

    /// Safety bound for draining at teardown (seconds)
    #[validate(range(min = 1))]
    pub drain_timeout_s: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_published_per_stream: 32,
            drain_timeout_s: DEFAULT_DRAIN_TIMEOUT_S,
        }
    }
}

/// Frame queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueueConfig {
    /// Maximum frames held before the oldest is dropped
    #[validate(range(min = 1))]
    pub capacity: usize,

    /// Pin every enqueued frame so the archive stops counting it
    #[serde(default)]
    pub keep_frames: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            keep_frames: false,
        }
    }
}

/// Synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncerConfig {
    /// Stream whose arrival drives frameset assembly
    pub key_stream: StreamId,

    /// Per-stream lane capacity
    #[serde(default = "default_lane_capacity")]
    #[validate(range(min = 1))]
    pub lane_capacity: usize,
}

fn default_lane_capacity() -> usize {
    DEFAULT_LANE_CAPACITY
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            key_stream: StreamId::from(StreamKind::Depth),
            lane_capacity: DEFAULT_LANE_CAPACITY,
        }
    }
}

impl SyncerConfig {
    pub fn new(key_stream: StreamId) -> Self {
        Self {
            key_stream,
            ..Default::default()
        }
    }
}

/// Stream production settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamConfig {
    /// Stream identifier
    pub stream: StreamId,

    /// Pixel format
    pub format: PixelFormat,

    /// Frames per second
    #[validate(range(min = 1, max = 1000))]
    pub fps: u32,

    /// Image width (video streams)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Image height (video streams)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Meters per depth unit (depth streams)
    #[serde(default = "default_depth_units")]
    pub depth_units: f32,

    /// Constant offset added to this stream's timestamps (ms)
    #[serde(default)]
    pub timestamp_offset_ms: f64,
}

fn default_depth_units() -> f32 {
    0.001
}
