//! Frame metadata attributes and the fixed-capacity blob that carries them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::FrameError;

/// Metadata value type
pub type MetadataValue = i64;

/// Capacity of a [`MetadataBlob`]
pub const METADATA_BLOB_CAPACITY: usize = 16;

/// Per-frame metadata attribute identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataAttribute {
    /// Sequential index managed per stream
    FrameCounter,
    /// Device clock when readout started (usec)
    FrameTimestamp,
    /// Middle of exposure (usec)
    SensorTimestamp,
    /// Exposure width (usec)
    ActualExposure,
    /// Relative sensor gain
    GainLevel,
    /// Auto exposure mode, zero when off
    AutoExposure,
    /// White balance as color temperature (Kelvin)
    WhiteBalance,
    /// Host time of arrival
    TimeOfArrival,
    /// Backend time of arrival
    BackendTimestamp,
    /// Measured frame rate
    ActualFps,
}

impl MetadataAttribute {
    /// Every attribute, in declaration order
    pub const ALL: [MetadataAttribute; 10] = [
        Self::FrameCounter,
        Self::FrameTimestamp,
        Self::SensorTimestamp,
        Self::ActualExposure,
        Self::GainLevel,
        Self::AutoExposure,
        Self::WhiteBalance,
        Self::TimeOfArrival,
        Self::BackendTimestamp,
        Self::ActualFps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrameCounter => "frame_counter",
            Self::FrameTimestamp => "frame_timestamp",
            Self::SensorTimestamp => "sensor_timestamp",
            Self::ActualExposure => "actual_exposure",
            Self::GainLevel => "gain_level",
            Self::AutoExposure => "auto_exposure",
            Self::WhiteBalance => "white_balance",
            Self::TimeOfArrival => "time_of_arrival",
            Self::BackendTimestamp => "backend_timestamp",
            Self::ActualFps => "actual_fps",
        }
    }
}

impl fmt::Display for MetadataAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-capacity array of typed key/value attributes.
///
/// Filled by the producing layer before publish; read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataBlob {
    entries: [(MetadataAttribute, MetadataValue); METADATA_BLOB_CAPACITY],
    len: usize,
}

impl Default for MetadataBlob {
    fn default() -> Self {
        Self {
            entries: [(MetadataAttribute::FrameCounter, 0); METADATA_BLOB_CAPACITY],
            len: 0,
        }
    }
}

impl MetadataBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an attribute
    ///
    /// # Errors
    /// `InvalidArgument` when the blob is full and the attribute is new.
    pub fn insert(
        &mut self,
        attribute: MetadataAttribute,
        value: MetadataValue,
    ) -> Result<(), FrameError> {
        if let Some(entry) = self.entries[..self.len]
            .iter_mut()
            .find(|(a, _)| *a == attribute)
        {
            entry.1 = value;
            return Ok(());
        }
        if self.len == METADATA_BLOB_CAPACITY {
            return Err(FrameError::invalid_argument(format!(
                "metadata blob full ({METADATA_BLOB_CAPACITY} entries), cannot add '{attribute}'"
            )));
        }
        self.entries[self.len] = (attribute, value);
        self.len += 1;
        Ok(())
    }

    pub fn get(&self, attribute: MetadataAttribute) -> Option<MetadataValue> {
        self.iter().find(|(a, _)| *a == attribute).map(|(_, v)| v)
    }

    pub fn contains(&self, attribute: MetadataAttribute) -> bool {
        self.get(attribute).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataAttribute, MetadataValue)> + '_ {
        self.entries[..self.len].iter().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
