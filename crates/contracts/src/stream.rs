//! StreamId - Copyable stream identifier
//!
//! A stream is identified by its kind plus an index (two infrared imagers on
//! one device are `infrared:1` and `infrared:2`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::FrameError;

/// Kind of sensor stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
    Fisheye,
    Gyro,
    Accel,
    Gpio,
    Pose,
}

impl StreamKind {
    pub const ALL: [StreamKind; 8] = [
        Self::Depth,
        Self::Color,
        Self::Infrared,
        Self::Fisheye,
        Self::Gyro,
        Self::Accel,
        Self::Gpio,
        Self::Pose,
    ];

    /// Lower-case name used in configs and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Color => "color",
            Self::Infrared => "infrared",
            Self::Fisheye => "fisheye",
            Self::Gyro => "gyro",
            Self::Accel => "accel",
            Self::Gpio => "gpio",
            Self::Pose => "pose",
        }
    }

    /// Whether frames of this kind carry an image
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            Self::Depth | Self::Color | Self::Infrared | Self::Fisheye
        )
    }

    /// Whether frames of this kind carry motion samples
    pub fn is_motion(&self) -> bool {
        matches!(self, Self::Gyro | Self::Accel)
    }
}

impl FromStr for StreamKind {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "depth" => Ok(Self::Depth),
            "color" => Ok(Self::Color),
            "infrared" => Ok(Self::Infrared),
            "fisheye" => Ok(Self::Fisheye),
            "gyro" => Ok(Self::Gyro),
            "accel" => Ok(Self::Accel),
            "gpio" => Ok(Self::Gpio),
            "pose" => Ok(Self::Pose),
            other => Err(FrameError::invalid_argument(format!(
                "unknown stream kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream identifier.
///
/// Ordered by kind then index, which is also the order framesets are
/// reported in.
///
/// # Examples
/// ```
/// use contracts::{StreamId, StreamKind};
///
/// let ir: StreamId = "infrared:2".parse().unwrap();
/// assert_eq!(ir, StreamId::new(StreamKind::Infrared, 2));
/// assert_eq!(StreamId::from(StreamKind::Depth).to_string(), "depth");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId {
    pub kind: StreamKind,
    pub index: u8,
}

impl StreamId {
    /// Create a new StreamId
    #[inline]
    pub const fn new(kind: StreamKind, index: u8) -> Self {
        Self { kind, index }
    }
}

impl From<StreamKind> for StreamId {
    #[inline]
    fn from(kind: StreamKind) -> Self {
        Self::new(kind, 0)
    }
}

impl FromStr for StreamId {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, index)) => {
                let index = index.trim().parse::<u8>().map_err(|e| {
                    FrameError::invalid_argument(format!("bad stream index in '{s}': {e}"))
                })?;
                Ok(Self::new(kind.trim().parse()?, index))
            }
            None => Ok(Self::from(s.trim().parse::<StreamKind>()?)),
        }
    }
}

impl TryFrom<String> for StreamId {
    type Error = FrameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}:{}", self.kind, self.index)
        }
    }
}
