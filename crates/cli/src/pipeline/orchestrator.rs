//! Pipeline orchestrator - coordinates all components.
//!
//! Mock streams publish into one archive and feed the syncer. A delivery
//! thread matches framesets, wraps each into a composite frame and pushes it
//! into the output queue; the caller's thread consumes that queue.
//!
//! Shutdown order: stop sources, flush syncer and queue, drain the archive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use archive::FrameArchive;
use contracts::{host_time_ms, SdkConfig, SensorInfo, StreamId};
use frame::FrameContext;
use frame_queue::FrameQueue;
use ingestion::IngestionPipeline;
use observability::{
    record_delivery_latency_ms, record_frameset_delivered, record_queue_depth, FramesetAggregator,
};
use syncer::Syncer;
use tracing::{debug, info, trace, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated SDK configuration
    pub sdk: SdkConfig,

    /// Maximum number of framesets to consume (None = unlimited)
    pub max_framesets: Option<u64>,

    /// Bound of each blocking wait in the delivery and consumer loops
    pub poll_interval: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Counters owned by the delivery thread
#[derive(Debug, Default)]
struct DeliveryStats {
    matched: u64,
    refused: u64,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends [`Pipeline::run`] when set
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run the pipeline until the frameset limit is reached or the stop
    /// flag is set. Blocks the calling thread.
    pub fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let sdk = &self.config.sdk;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let archive = FrameArchive::new(
            sdk.archive.clone(),
            FrameContext::standard(),
            SensorInfo {
                name: "mock-device".to_string(),
                serial: "000000000000".to_string(),
            },
        );
        let syncer = Arc::new(Syncer::with_config(&sdk.syncer));
        let queue = Arc::new(FrameQueue::with_config(&sdk.queue));

        let ingestion = IngestionPipeline::from_configs(&sdk.streams, &archive)
            .context("Failed to build stream sources")?;
        let expected: Vec<StreamId> = ingestion.streams().collect();
        if expected.is_empty() {
            warn!("No streams configured - no framesets will be produced");
        }
        let aggregator = Arc::new(Mutex::new(FramesetAggregator::new(expected.clone())));

        info!(
            streams = expected.len(),
            key_stream = %syncer.key_stream(),
            lane_capacity = syncer.lane_capacity(),
            queue_capacity = queue.capacity(),
            "Pipeline configured"
        );

        let delivery = {
            let syncer = syncer.clone();
            let queue = queue.clone();
            let archive = archive.clone();
            let aggregator = aggregator.clone();
            let stop = self.stop.clone();
            let poll = self.config.poll_interval;
            thread::Builder::new()
                .name("frameset-delivery".to_string())
                .spawn(move || deliver(&syncer, &queue, &archive, &aggregator, &expected, &stop, poll))
                .context("Failed to spawn delivery thread")?
        };

        if let Err(e) = ingestion.start_all(syncer.clone()) {
            self.stop.store(true, Ordering::SeqCst);
            let _ = delivery.join();
            return Err(e).context("Failed to start stream sources");
        }
        info!(max_framesets = ?self.config.max_framesets, "Pipeline running");

        let framesets_consumed = self.consume(&queue);

        // Shutdown
        info!("Shutting down pipeline...");
        self.stop.store(true, Ordering::SeqCst);
        ingestion.stop_all();
        let delivered = delivery.join().unwrap_or_else(|_| {
            warn!("Delivery thread panicked");
            DeliveryStats::default()
        });
        syncer.flush();
        queue.flush();

        debug!(in_use = archive.in_use(), "Draining archive");
        archive
            .flush()
            .context("Archive did not drain within the configured timeout")?;

        let ingestion_metrics = ingestion.metrics().snapshot();
        let summary = aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary();

        let stats = PipelineStats {
            framesets_matched: delivered.matched,
            framesets_consumed,
            framesets_dropped: queue.dropped_count(),
            composites_refused: delivered.refused,
            frames_produced: ingestion_metrics.frames_produced,
            frames_refused: ingestion_metrics.frames_refused,
            syncer_dropped: syncer.dropped_count(),
            duration: start_time.elapsed(),
            active_streams: ingestion.source_count(),
            framesets: summary,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Consumer loop on the calling thread
    fn consume(&self, queue: &FrameQueue) -> u64 {
        let mut consumed = 0u64;

        while !self.stop.load(Ordering::SeqCst) {
            let composite = match queue.wait_for_frame(self.config.poll_interval) {
                Ok(composite) => composite,
                Err(e) if e.is_timeout() => continue,
                Err(e) => {
                    warn!(error = %e, "Output queue failed");
                    break;
                }
            };

            consumed += 1;
            record_queue_depth("output", queue.len());
            if composite.system_time() > 0.0 {
                record_delivery_latency_ms(host_time_ms() - composite.system_time());
            }
            trace!(
                frame_number = composite.frame_number(),
                timestamp = format!("{:.3}", composite.timestamp()),
                frames = composite.embedded_count(),
                "Frameset consumed"
            );
            drop(composite);

            if let Some(max) = self.config.max_framesets {
                if consumed >= max {
                    info!(framesets = consumed, "Reached max framesets limit");
                    break;
                }
            }
        }

        consumed
    }
}

/// Delivery loop: syncer → composite → output queue
fn deliver(
    syncer: &Syncer,
    queue: &FrameQueue,
    archive: &Arc<FrameArchive>,
    aggregator: &Mutex<FramesetAggregator>,
    expected: &[StreamId],
    stop: &AtomicBool,
    poll: Duration,
) -> DeliveryStats {
    let mut stats = DeliveryStats::default();

    while !stop.load(Ordering::SeqCst) {
        let set = syncer.wait_for_frames(poll);
        if set.is_empty() {
            continue;
        }

        stats.matched += 1;
        record_frameset_delivered(&set, expected);
        aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&set);

        let size = set.len();
        match set.into_composite(archive.clone()) {
            Some(composite) => queue.enqueue(composite),
            None => {
                stats.refused += 1;
                warn!(size, "Archive refused frameset composite");
            }
        }
    }

    debug!(matched = stats.matched, refused = stats.refused, "Delivery stopped");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{PixelFormat, StreamConfig, StreamKind, SyncerConfig};

    fn stream(kind: StreamKind, format: PixelFormat, fps: u32, offset: f64) -> StreamConfig {
        let video = kind.is_video();
        StreamConfig {
            stream: kind.into(),
            format,
            fps,
            width: video.then_some(16),
            height: video.then_some(12),
            depth_units: 0.001,
            timestamp_offset_ms: offset,
        }
    }

    fn test_config(max_framesets: Option<u64>) -> PipelineConfig {
        let mut sdk = SdkConfig {
            syncer: SyncerConfig::new(StreamKind::Depth.into()),
            streams: vec![
                stream(StreamKind::Depth, PixelFormat::Z16, 100, 0.0),
                stream(StreamKind::Color, PixelFormat::Rgb8, 100, 2.0),
                stream(StreamKind::Gyro, PixelFormat::MotionXyz32f, 400, 0.0),
            ],
            ..Default::default()
        };
        sdk.queue.capacity = 4;
        PipelineConfig {
            sdk,
            max_framesets,
            poll_interval: Duration::from_millis(20),
            metrics_port: None,
        }
    }

    #[test]
    fn test_run_until_max_framesets() {
        let stats = Pipeline::new(test_config(Some(5))).run().unwrap();

        assert_eq!(stats.framesets_consumed, 5);
        assert!(stats.framesets_matched >= 5);
        assert!(stats.frames_produced > 0);
        assert_eq!(stats.active_streams, 3);
        assert!(stats.framesets.total_framesets >= 5);
    }

    #[test]
    fn test_stop_handle_ends_run() {
        let pipeline = Pipeline::new(test_config(None));
        let stop = pipeline.stop_handle();
        let handle = thread::spawn(move || pipeline.run());

        thread::sleep(Duration::from_millis(150));
        stop.store(true, Ordering::SeqCst);

        let stats = handle.join().unwrap().unwrap();
        assert!(stats.framesets_matched > 0);
    }

    #[test]
    fn test_invalid_stream_fails_before_running() {
        let mut config = test_config(Some(1));
        config.sdk.streams[1].width = None;

        let err = Pipeline::new(config).run().unwrap_err();
        assert!(format!("{err:#}").contains("Failed to build stream sources"));
    }
}
