//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{SdkConfig, StreamConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Debug, Serialize)]
struct ConfigInfo {
    archive: ArchiveInfo,
    queue: QueueInfo,
    syncer: SyncerInfo,
    streams: Vec<StreamInfo>,
    /// Sum of all stream bandwidths
    total_bandwidth_mb_s: f64,
}

#[derive(Debug, Serialize)]
struct ArchiveInfo {
    max_published_per_stream: usize,
    drain_timeout_s: u64,
}

#[derive(Debug, Serialize)]
struct QueueInfo {
    capacity: usize,
    keep_frames: bool,
}

#[derive(Debug, Serialize)]
struct SyncerInfo {
    key_stream: String,
    lane_capacity: usize,
}

#[derive(Debug, Serialize)]
struct StreamInfo {
    stream: String,
    format: String,
    fps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    bits_per_pixel: u32,
    /// Bytes per frame
    frame_size: usize,
    frame_interval_ms: f64,
    bandwidth_mb_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth_units: Option<f32>,
}

impl StreamInfo {
    fn from_config(config: &StreamConfig) -> Self {
        let bits_per_pixel = config.format.bits_per_pixel();
        let resolution = config.width.zip(config.height);
        let frame_size = match resolution {
            Some((w, h)) => (w as usize * h as usize * bits_per_pixel as usize).div_ceil(8),
            None => (bits_per_pixel as usize).div_ceil(8),
        };
        let frame_interval_ms = 1000.0 / config.fps as f64;
        let bandwidth_mb_s = frame_size as f64 * config.fps as f64 / (1024.0 * 1024.0);

        Self {
            stream: config.stream.to_string(),
            format: config.format.to_string(),
            fps: config.fps,
            resolution: resolution.map(|(w, h)| format!("{w}x{h}")),
            bits_per_pixel,
            frame_size,
            frame_interval_ms,
            bandwidth_mb_s,
            depth_units: (config.stream.kind == contracts::StreamKind::Depth)
                .then_some(config.depth_units),
        }
    }
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let sdk = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&sdk);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(sdk: &SdkConfig) -> ConfigInfo {
    let streams: Vec<StreamInfo> = sdk.streams.iter().map(StreamInfo::from_config).collect();
    let total_bandwidth_mb_s = streams.iter().map(|s| s.bandwidth_mb_s).sum();

    ConfigInfo {
        archive: ArchiveInfo {
            max_published_per_stream: sdk.archive.max_published_per_stream,
            drain_timeout_s: sdk.archive.drain_timeout_s,
        },
        queue: QueueInfo {
            capacity: sdk.queue.capacity,
            keep_frames: sdk.queue.keep_frames,
        },
        syncer: SyncerInfo {
            key_stream: sdk.syncer.key_stream.to_string(),
            lane_capacity: sdk.syncer.lane_capacity,
        },
        streams,
        total_bandwidth_mb_s,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Frame Syncer Configuration                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🗄  Archive");
    println!(
        "   ├─ Max published per stream: {}",
        info.archive.max_published_per_stream
    );
    println!("   └─ Drain timeout: {}s", info.archive.drain_timeout_s);

    println!("\n📥 Queue");
    println!("   ├─ Capacity: {}", info.queue.capacity);
    println!("   └─ Keep frames: {}", info.queue.keep_frames);

    println!("\n⚙️  Syncer");
    println!("   ├─ Key stream: {}", info.syncer.key_stream);
    println!("   └─ Lane capacity: {}", info.syncer.lane_capacity);

    println!("\n📷 Streams ({})", info.streams.len());
    for (i, stream) in info.streams.iter().enumerate() {
        let is_last = i == info.streams.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        match &stream.resolution {
            Some(resolution) => println!(
                "   {} {} ({}, {}, {} fps)",
                prefix, stream.stream, stream.format, resolution, stream.fps
            ),
            None => println!(
                "   {} {} ({}, {} fps)",
                prefix, stream.stream, stream.format, stream.fps
            ),
        }
        println!(
            "   {}  ├─ Frame: {} bytes every {:.2} ms",
            child_prefix, stream.frame_size, stream.frame_interval_ms
        );
        if let Some(units) = stream.depth_units {
            println!("   {}  ├─ Depth units: {} m", child_prefix, units);
        }
        println!(
            "   {}  └─ Bandwidth: {:.2} MB/s",
            child_prefix, stream.bandwidth_mb_s
        );
    }
    if !info.streams.is_empty() {
        println!("\n   Total bandwidth: {:.2} MB/s", info.total_bandwidth_mb_s);
    }

    println!();
}
