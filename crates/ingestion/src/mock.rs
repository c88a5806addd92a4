//! Mock 流数据源
//!
//! 无设备环境下按配置帧率产生帧，经 archive 发布后投递到 sink。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use archive::FrameArchive;
use bytes::{Bytes, BytesMut};
use contracts::{
    host_time_ms, FrameError, FrameHeader, MetadataAttribute, MetadataValue, PixelFormat,
    StreamConfig, StreamId, StreamKind, StreamProfile, TimestampDomain,
};
use frame::{Frame, FrameBuilder, FrameHandle, VideoInfo};
use frame_queue::FrameSink;
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};
use crate::source::StreamSource;

/// Mock 图像流的增益
const MOCK_GAIN: MetadataValue = 16;

/// 深度渐变的取值范围 (深度单位)
const GRADIENT_SPAN: u64 = 4000;

/// 深度渐变的最小值，避免出现无效的 0 深度
const GRADIENT_BASE: u16 = 300;

/// 深度帧像素 `(x, y)` 的原始值
pub fn gradient_value(x: u32, y: u32, frame_number: u64) -> u16 {
    let step = (u64::from(x) + u64::from(y) + frame_number) % GRADIENT_SPAN;
    GRADIENT_BASE + step as u16
}

/// 生成帧所需的全部状态，投递线程持有一份克隆
#[derive(Clone)]
struct Producer {
    config: StreamConfig,
    profile: Arc<StreamProfile>,
    archive: Arc<FrameArchive>,
    epoch: Instant,
    jitter_ms: f64,
    running: Arc<AtomicBool>,
    metrics: Arc<IngestionMetrics>,
}

impl Producer {
    fn stream(&self) -> StreamId {
        self.config.stream
    }

    fn timestamp(&self) -> f64 {
        let mut timestamp =
            self.epoch.elapsed().as_secs_f64() * 1000.0 + self.config.timestamp_offset_ms;
        if self.jitter_ms > 0.0 {
            timestamp += rand::rng().random_range(-self.jitter_ms..=self.jitter_ms);
        }
        timestamp
    }

    fn produce(&self, frame_number: u64) -> Option<FrameHandle> {
        let stream = self.stream().to_string();
        let frame = match self.build_frame(frame_number, self.timestamp()) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_build_error();
                metrics::counter!("ingestion_frames_dropped_total", "stream" => stream, "reason" => "build")
                    .increment(1);
                warn!(stream = %self.stream(), frame_number, error = %e, "failed to build frame");
                return None;
            }
        };

        match self.archive.publish(frame) {
            Some(handle) => {
                self.metrics.record_produced();
                metrics::counter!("ingestion_frames_produced_total", "stream" => stream).increment(1);
                Some(handle)
            }
            None => {
                self.metrics.record_refused();
                metrics::counter!("ingestion_frames_dropped_total", "stream" => stream, "reason" => "refused")
                    .increment(1);
                trace!(stream = %self.stream(), frame_number, "archive refused frame");
                None
            }
        }
    }

    fn build_frame(&self, frame_number: u64, timestamp: f64) -> std::result::Result<Frame, FrameError> {
        let now = host_time_ms();
        let header = FrameHeader::new(frame_number, timestamp, TimestampDomain::HardwareClock)
            .with_arrival(now, now);
        let builder = FrameBuilder::new()
            .header(header)
            .profile(self.profile.clone());

        let kind = self.stream().kind;
        let builder = match self.profile.resolution {
            Some(resolution) if kind.is_video() => {
                let exposure = 1_000_000 / MetadataValue::from(self.config.fps) / 2;
                let builder = builder
                    .metadata(MetadataAttribute::ActualExposure, exposure)
                    .metadata(MetadataAttribute::GainLevel, MOCK_GAIN)
                    .metadata(MetadataAttribute::AutoExposure, 1)
                    .metadata(
                        MetadataAttribute::SensorTimestamp,
                        (timestamp * 1000.0) as MetadataValue + exposure / 2,
                    );

                let info = VideoInfo::packed(
                    resolution.width,
                    resolution.height,
                    self.profile.format.bits_per_pixel(),
                );
                let mut buffer = self.archive.alloc_buffer(self.profile.image_size(), timestamp);
                if kind == StreamKind::Depth {
                    fill_gradient(&mut buffer, resolution.width, frame_number);
                    builder
                        .data(buffer.freeze())
                        .depth(info, self.config.depth_units, None)
                } else {
                    buffer.fill((frame_number % 256) as u8);
                    builder.data(buffer.freeze()).video(info)
                }
            }
            _ if kind.is_motion() => {
                let sample = motion_sample(kind, timestamp);
                builder
                    .data(Bytes::copy_from_slice(bytemuck::cast_slice(&sample)))
                    .motion()
            }
            _ => builder,
        };
        builder.build()
    }

    fn run(self, sink: Arc<dyn FrameSink>) {
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.config.fps));
        let mut frame_number: u64 = 0;
        let mut next_tick = Instant::now();

        debug!(
            stream = %self.stream(),
            fps = self.config.fps,
            format = %self.config.format,
            "mock stream source started"
        );

        while self.running.load(Ordering::Relaxed) {
            frame_number += 1;
            if let Some(frame) = self.produce(frame_number) {
                sink.enqueue(frame);
            }

            next_tick += interval;
            let now = Instant::now();
            if next_tick > now {
                // stop() unparks
                thread::park_timeout(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        debug!(stream = %self.stream(), frames = frame_number, "mock stream source stopped");
    }
}

/// Little-endian u16 gradient, one value per two bytes
fn fill_gradient(buffer: &mut BytesMut, width: u32, frame_number: u64) {
    let width = width.max(1) as usize;
    for (i, pixel) in buffer.chunks_exact_mut(2).enumerate() {
        let value = gradient_value((i % width) as u32, (i / width) as u32, frame_number);
        pixel.copy_from_slice(&value.to_le_bytes());
    }
}

/// X, Y, Z 三个 f32
fn motion_sample(kind: StreamKind, timestamp: f64) -> [f32; 3] {
    match kind {
        StreamKind::Accel => [0.0, -9.81, 0.0],
        _ => [0.0, 0.0, ((timestamp / 1000.0).sin() * 0.01) as f32],
    }
}

/// 由流配置生成流描述
fn profile_for(config: &StreamConfig) -> Result<StreamProfile> {
    let invalid = |message: &str| IngestionError::InvalidStream {
        stream: config.stream,
        message: message.to_string(),
    };

    if config.fps == 0 {
        return Err(invalid("fps must be positive"));
    }
    if config.stream.kind == StreamKind::Depth && config.depth_units <= 0.0 {
        return Err(invalid("depth_units must be positive"));
    }

    if config.stream.kind.is_video() {
        match (config.width, config.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Ok(StreamProfile::video(
                config.stream,
                config.format,
                config.fps,
                width,
                height,
            )),
            _ => Err(invalid("video streams need width and height")),
        }
    } else {
        Ok(StreamProfile::motion(config.stream, config.format, config.fps))
    }
}

/// Mock 流数据源
///
/// 在名为 `stream-<id>` 的 OS 线程上按帧率产生帧。帧号从 1 开始单调递增，
/// 时间戳为自共享 `epoch` 起的毫秒数加上 `timestamp_offset_ms`。
pub struct MockStreamSource {
    producer: Producer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for MockStreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStreamSource")
            .field("stream", &self.producer.stream())
            .field("fps", &self.producer.config.fps)
            .field("listening", &self.is_listening())
            .finish()
    }
}

impl MockStreamSource {
    /// 创建新的 Mock 流数据源
    ///
    /// # Errors
    /// 视频流缺少分辨率、fps 为 0 或深度单位非正时返回 `InvalidStream`。
    pub fn new(config: StreamConfig, archive: Arc<FrameArchive>, epoch: Instant) -> Result<Self> {
        let profile = Arc::new(profile_for(&config)?);
        Ok(Self {
            producer: Producer {
                config,
                profile,
                archive,
                epoch,
                jitter_ms: 0.0,
                running: Arc::new(AtomicBool::new(false)),
                metrics: Arc::new(IngestionMetrics::new()),
            },
            worker: Mutex::new(None),
        })
    }

    /// 创建 Mock 深度流 (Z16, 1mm)
    pub fn depth(archive: Arc<FrameArchive>, fps: u32, width: u32, height: u32) -> Result<Self> {
        Self::new(
            StreamConfig {
                stream: StreamKind::Depth.into(),
                format: PixelFormat::Z16,
                fps,
                width: Some(width),
                height: Some(height),
                depth_units: 0.001,
                timestamp_offset_ms: 0.0,
            },
            archive,
            Instant::now(),
        )
    }

    /// 创建 Mock 彩色流 (RGB8)
    pub fn color(archive: Arc<FrameArchive>, fps: u32, width: u32, height: u32) -> Result<Self> {
        Self::new(
            StreamConfig {
                stream: StreamKind::Color.into(),
                format: PixelFormat::Rgb8,
                fps,
                width: Some(width),
                height: Some(height),
                depth_units: 0.001,
                timestamp_offset_ms: 0.0,
            },
            archive,
            Instant::now(),
        )
    }

    /// 创建 Mock 陀螺仪流
    pub fn gyro(archive: Arc<FrameArchive>, fps: u32) -> Result<Self> {
        Self::new(
            StreamConfig {
                stream: StreamKind::Gyro.into(),
                format: PixelFormat::MotionXyz32f,
                fps,
                width: None,
                height: None,
                depth_units: 0.001,
                timestamp_offset_ms: 0.0,
            },
            archive,
            Instant::now(),
        )
    }

    /// 时间戳加入 `±jitter_ms` 的均匀抖动
    pub fn with_jitter(mut self, jitter_ms: f64) -> Self {
        self.producer.jitter_ms = jitter_ms.max(0.0);
        self
    }

    /// 与其他源共享统计
    pub fn with_metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.producer.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.producer.metrics
    }

    pub fn config(&self) -> &StreamConfig {
        &self.producer.config
    }

    /// 在调用线程上同步产生并发布一帧
    pub fn produce(&self, frame_number: u64) -> Option<FrameHandle> {
        self.producer.produce(frame_number)
    }

    fn worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamSource for MockStreamSource {
    fn stream(&self) -> StreamId {
        self.producer.stream()
    }

    fn profile(&self) -> Arc<StreamProfile> {
        self.producer.profile.clone()
    }

    fn listen(&self, sink: Arc<dyn FrameSink>) -> Result<()> {
        let stream = self.stream();
        let mut worker = self.worker();
        if self.producer.running.swap(true, Ordering::SeqCst) {
            return Err(IngestionError::AlreadyListening { stream });
        }

        let producer = self.producer.clone();
        let spawned = thread::Builder::new()
            .name(format!("stream-{stream}"))
            .spawn(move || producer.run(sink));
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.producer.running.store(false, Ordering::SeqCst);
                Err(IngestionError::ThreadSpawn { stream, source })
            }
        }
    }

    fn stop(&self) {
        let mut worker = self.worker();
        if !self.producer.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(handle) = worker.take() else {
            return;
        };

        handle.thread().unpark();
        // A sink may stop its own source from the delivery thread
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(stream = %self.stream(), "delivery thread panicked");
        }
    }

    fn is_listening(&self) -> bool {
        self.producer.running.load(Ordering::SeqCst)
    }
}

impl Drop for MockStreamSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ArchiveConfig, SensorInfo};
    use frame::FrameContext;

    fn archive_with_limit(max_published_per_stream: usize) -> Arc<FrameArchive> {
        FrameArchive::new(
            ArchiveConfig {
                max_published_per_stream,
                ..Default::default()
            },
            FrameContext::standard(),
            SensorInfo::default(),
        )
    }

    #[test]
    fn test_depth_frame_contents() {
        let archive = archive_with_limit(8);
        let source = MockStreamSource::depth(archive.clone(), 30, 8, 4).unwrap();

        let frame = source.produce(3).unwrap();
        assert_eq!(frame.frame_number(), 3);
        assert_eq!(frame.data_size(), 8 * 4 * 2);
        assert_eq!(frame.stream(), Some(StreamKind::Depth.into()));

        let expected = f32::from(gradient_value(5, 2, 3)) * 0.001;
        let distance = frame.get_distance(5, 2).unwrap();
        assert!((distance - expected).abs() < 1e-6);

        assert_eq!(
            frame
                .get_frame_metadata(MetadataAttribute::GainLevel)
                .unwrap(),
            MOCK_GAIN
        );
        assert_eq!(
            frame
                .get_frame_metadata(MetadataAttribute::ActualExposure)
                .unwrap(),
            1_000_000 / 30 / 2
        );
        drop(frame);
        assert_eq!(archive.in_use(), 0);
    }

    #[test]
    fn test_motion_frame_carries_three_floats() {
        let archive = archive_with_limit(8);
        let source = MockStreamSource::gyro(archive, 200).unwrap();

        let frame = source.produce(1).unwrap();
        assert_eq!(frame.data_size(), 12);
        let sample: [f32; 3] = bytemuck::pod_read_unaligned(frame.data());
        assert_eq!(sample[0], 0.0);
        assert!(sample[2].abs() <= 0.01);
    }

    #[test]
    fn test_video_without_resolution_rejected() {
        let archive = archive_with_limit(8);
        let config = StreamConfig {
            stream: StreamKind::Infrared.into(),
            format: PixelFormat::Y8,
            fps: 30,
            width: None,
            height: Some(480),
            depth_units: 0.001,
            timestamp_offset_ms: 0.0,
        };

        let err = MockStreamSource::new(config, archive, Instant::now()).unwrap_err();
        assert!(matches!(err, IngestionError::InvalidStream { .. }));
    }

    #[test]
    fn test_refused_publish_counted() {
        let archive = archive_with_limit(1);
        let source = MockStreamSource::color(archive, 30, 4, 4).unwrap();

        let held = source.produce(1).unwrap();
        assert!(source.produce(2).is_none());

        let snapshot = source.metrics().snapshot();
        assert_eq!(snapshot.frames_produced, 1);
        assert_eq!(snapshot.frames_refused, 1);
        assert_eq!(snapshot.frames_dropped(), 1);
        drop(held);
    }

    #[test]
    fn test_timestamp_offset_applied() {
        let archive = archive_with_limit(8);
        let epoch = Instant::now();
        let config = StreamConfig {
            stream: StreamKind::Accel.into(),
            format: PixelFormat::MotionXyz32f,
            fps: 100,
            width: None,
            height: None,
            depth_units: 0.001,
            timestamp_offset_ms: 250.0,
        };
        let source = MockStreamSource::new(config, archive, epoch).unwrap();

        let frame = source.produce(1).unwrap();
        assert!(frame.timestamp() >= 250.0);
        assert!(frame.timestamp() < 250.0 + epoch.elapsed().as_secs_f64() * 1000.0 + 1.0);
    }

    #[test]
    fn test_listen_delivers_monotonic_frames() {
        let archive = archive_with_limit(16);
        let source = MockStreamSource::depth(archive.clone(), 200, 4, 4).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let sink = move |frame: FrameHandle| {
            let name = thread::current().name().map(str::to_string);
            recorded
                .lock()
                .unwrap()
                .push((frame.frame_number(), frame.timestamp(), name));
        };

        source.listen(Arc::new(sink)).unwrap();
        assert!(source.is_listening());
        thread::sleep(Duration::from_millis(100));
        source.stop();
        assert!(!source.is_listening());

        let delivered = seen.lock().unwrap().clone();
        assert!(!delivered.is_empty());
        for (i, (frame_number, _, name)) in delivered.iter().enumerate() {
            assert_eq!(*frame_number, i as u64 + 1);
            assert_eq!(name.as_deref(), Some("stream-depth"));
        }
        assert!(delivered.windows(2).all(|w| w[0].1 <= w[1].1));

        // Nothing is delivered after stop returns
        thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.lock().unwrap().len(), delivered.len());
        assert_eq!(archive.in_use(), 0);
    }

    #[test]
    fn test_listen_twice_rejected() {
        let archive = archive_with_limit(16);
        let source = MockStreamSource::gyro(archive, 50).unwrap();
        let sink: Arc<dyn FrameSink> = Arc::new(|_frame: FrameHandle| {});

        source.listen(sink.clone()).unwrap();
        let err = source.listen(sink).unwrap_err();
        assert!(matches!(err, IngestionError::AlreadyListening { .. }));
    }
}
