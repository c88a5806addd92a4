//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式，带投递线程名)
//! - Prometheus 指标导出，安装时登记全部帧运行时指标的说明
//! - Frameset 指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init, metrics};
//!
//! // 初始化
//! observability::init()?;
//!
//! // 记录同步结果
//! let set = syncer.wait_for_frames(timeout);
//! metrics::record_frameset_delivered(&set, &expected);
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_delivery_latency_ms, record_frameset_delivered, record_queue_depth,
    FramesetAggregator, FramesetSummary, RunningStats, StatsSummary,
};

/// 初始化可观测性（Tracing + Prometheus）
///
/// - Tracing: JSON 格式，支持 RUST_LOG 环境变量
/// - Prometheus: 监听 0.0.0.0:9000
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// 默认日志级别，RUST_LOG 优先
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(9000),
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => anyhow::bail!("unknown log format: {other}"),
        }
    }
}

/// 使用自定义配置初始化
///
/// 投递线程按 `stream-<id>` 命名，所有格式都输出线程名。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_thread_names(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on {addr}"))?;
    describe_metrics();

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}

/// 登记帧运行时各 crate 上报的指标说明 (Prometheus HELP)
pub fn describe_metrics() {
    // frame_pool / frame_queue
    describe_gauge!("frame_pool_occupancy", "Live slots per pooled allocator");
    describe_counter!(
        "frame_queue_dropped_total",
        "Frames released because a queue was full"
    );
    describe_gauge!("frame_queue_depth", "Frames waiting in a consumer queue");

    // syncer
    describe_counter!("syncer_framesets_total", "Framesets assembled");
    describe_counter!("syncer_dropped_total", "Frames evicted from a full lane");
    describe_counter!(
        "syncer_domain_mismatch_total",
        "Matches across different timestamp domains"
    );
    describe_histogram!("syncer_frameset_size", "Frames per assembled frameset");
    describe_histogram!(
        "syncer_alignment_error_ms",
        Unit::Milliseconds,
        "Distance between a matched frame and its key frame"
    );

    // archive
    describe_counter!(
        "archive_publish_refused_total",
        "Publishes refused by the archive, by reason"
    );
    describe_gauge!("archive_published_frames", "Unkept published frames per stream");
    describe_gauge!("archive_freelist_buffers", "Recycled data buffers held");
    describe_counter!("archive_buffer_reuse_total", "Allocations served from the freelist");
    describe_histogram!(
        "archive_frame_hold_ms",
        Unit::Milliseconds,
        "Time between arrival and release of a frame"
    );

    // ingestion
    describe_counter!("ingestion_frames_produced_total", "Frames published by a source");
    describe_counter!(
        "ingestion_frames_dropped_total",
        "Frames a source failed to build or publish"
    );

    // consumer
    describe_counter!("frameset_delivered_total", "Framesets handed to the consumer");
    describe_counter!(
        "frameset_incomplete_total",
        "Delivered framesets missing at least one stream"
    );
    describe_counter!(
        "frameset_stream_missing_total",
        "Delivered framesets without this stream"
    );
    describe_gauge!("frameset_streams_missing", "Streams missing from the last frameset");
    describe_gauge!("frameset_last_frame_number", "Key frame number of the last frameset");
    describe_histogram!(
        "frameset_delivery_latency_ms",
        Unit::Milliseconds,
        "Key frame arrival to consumer pickup"
    );
}
