//! StreamProfile - 流描述
//!
//! 像素格式、时间戳域、分辨率与传感器信息。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{FrameError, StreamId};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 16-bit 线性深度值，深度(米) = depth_units * 像素值
    Z16,
    /// 16-bit 线性视差值
    Disparity16,
    /// 32-bit 浮点 3D 坐标
    Xyz32f,
    Yuyv,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    /// 8-bit 灰度
    Y8,
    /// 16-bit 灰度
    Y16,
    Raw10,
    Raw16,
    Raw8,
    Uyvy,
    /// 运动传感器原始数据
    MotionRaw,
    /// 运动数据，3 个 32-bit 浮点 (X, Y, Z)
    MotionXyz32f,
    GpioRaw,
    /// 32-bit 浮点距离
    Distance,
}

impl PixelFormat {
    /// 每像素位数
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Y8 | Self::Raw8 | Self::MotionRaw | Self::GpioRaw => 8,
            Self::Raw10 => 10,
            Self::Z16
            | Self::Disparity16
            | Self::Y16
            | Self::Raw16
            | Self::Yuyv
            | Self::Uyvy => 16,
            Self::Rgb8 | Self::Bgr8 => 24,
            Self::Rgba8 | Self::Bgra8 | Self::Distance => 32,
            Self::Xyz32f | Self::MotionXyz32f => 96,
        }
    }

    /// 配置/日志中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Z16 => "z16",
            Self::Disparity16 => "disparity16",
            Self::Xyz32f => "xyz32f",
            Self::Yuyv => "yuyv",
            Self::Rgb8 => "rgb8",
            Self::Bgr8 => "bgr8",
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
            Self::Y8 => "y8",
            Self::Y16 => "y16",
            Self::Raw10 => "raw10",
            Self::Raw16 => "raw16",
            Self::Raw8 => "raw8",
            Self::Uyvy => "uyvy",
            Self::MotionRaw => "motion_raw",
            Self::MotionXyz32f => "motion_xyz32f",
            Self::GpioRaw => "gpio_raw",
            Self::Distance => "distance",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
            .map_err(|_| FrameError::invalid_argument(format!("unknown pixel format: {s}")))
    }
}

/// 时间戳域
///
/// 只有同一时间戳域内的时间戳可以比较。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampDomain {
    /// 设备硬件时钟
    #[default]
    HardwareClock,
    /// 主机系统时钟
    SystemTime,
    /// 硬件时钟映射到主机时钟
    GlobalTime,
}

impl fmt::Display for TimestampDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HardwareClock => "hardware_clock",
            Self::SystemTime => "system_time",
            Self::GlobalTime => "global_time",
        };
        f.write_str(name)
    }
}

/// 视频分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// 流配置描述
///
/// 由设备层提供，帧只持有共享引用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamProfile {
    /// 流 ID
    pub stream: StreamId,

    /// 像素格式
    pub format: PixelFormat,

    /// 帧率
    pub fps: u32,

    /// 分辨率 (仅视频流)
    pub resolution: Option<Resolution>,
}

impl StreamProfile {
    /// 创建视频流描述
    pub fn video(stream: StreamId, format: PixelFormat, fps: u32, width: u32, height: u32) -> Self {
        Self {
            stream,
            format,
            fps,
            resolution: Some(Resolution { width, height }),
        }
    }

    /// 创建运动流描述
    pub fn motion(stream: StreamId, format: PixelFormat, fps: u32) -> Self {
        Self {
            stream,
            format,
            fps,
            resolution: None,
        }
    }

    /// 单帧图像字节数 (无分辨率时为 0)
    pub fn image_size(&self) -> usize {
        self.resolution.map_or(0, |r| {
            (r.width as usize * r.height as usize * self.format.bits_per_pixel() as usize) / 8
        })
    }
}

/// 传感器信息
///
/// 帧通过弱引用指向产生它的传感器。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// 传感器名称
    pub name: String,

    /// 设备序列号
    pub serial: String,
}
