//! FrameHeader - fixed-size per-frame timing data
//!
//! Plain `Copy` data with no owning pointers, so a composite frame can copy
//! the header of its first child.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimestampDomain;

/// Frame header
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Sequence number, monotonic per stream
    pub frame_number: u64,

    /// Stream-clock timestamp (milliseconds)
    pub timestamp: f64,

    /// Clock the timestamp was measured against
    pub timestamp_domain: TimestampDomain,

    /// Host time the frame arrived at the SDK (milliseconds)
    pub system_time: f64,

    /// Host time the backend received the frame (milliseconds)
    pub backend_time: f64,
}

impl FrameHeader {
    /// Header with frame number and timestamp set, arrival times zeroed
    pub fn new(frame_number: u64, timestamp: f64, timestamp_domain: TimestampDomain) -> Self {
        Self {
            frame_number,
            timestamp,
            timestamp_domain,
            system_time: 0.0,
            backend_time: 0.0,
        }
    }

    /// Set arrival times
    pub fn with_arrival(mut self, system_time: f64, backend_time: f64) -> Self {
        self.system_time = system_time;
        self.backend_time = backend_time;
        self
    }

    /// Absolute distance to another timestamp
    #[inline]
    pub fn distance_to(&self, timestamp: f64) -> f64 {
        (self.timestamp - timestamp).abs()
    }
}

/// Host wall-clock time in milliseconds since the Unix epoch
pub fn host_time_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
}
