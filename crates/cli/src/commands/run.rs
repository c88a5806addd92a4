//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    // Load and parse configuration
    let mut sdk = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(key_stream) = args.key_stream {
        info!(key_stream = %key_stream, "Overriding key stream from CLI");
        sdk.syncer.key_stream = key_stream;
        config_loader::ConfigLoader::validate(&sdk).context("Invalid key stream override")?;
    }

    info!(
        streams = sdk.streams.len(),
        key_stream = %sdk.syncer.key_stream,
        queue_capacity = sdk.queue.capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&sdk);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        sdk,
        max_framesets: (args.max_framesets > 0).then_some(args.max_framesets),
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });
    let stop = pipeline.stop_handle();

    info!("Starting pipeline...");

    // The consumer blocks; run it off the async workers
    let mut task = tokio::task::spawn_blocking(move || pipeline.run());

    let deadline = async {
        match args.timeout {
            0 => std::future::pending::<()>().await,
            secs => tokio::time::sleep(Duration::from_secs(secs)).await,
        }
    };

    tokio::select! {
        result = &mut task => {
            let stats = result
                .context("Pipeline task panicked")?
                .context("Pipeline execution failed")?;
            report(&stats);
            info!("Frame Syncer finished");
            return Ok(());
        }
        _ = setup_shutdown_signal() => {
            warn!("Received shutdown signal, stopping pipeline...");
        }
        _ = deadline => {
            warn!(timeout_secs = args.timeout, "Pipeline timed out, stopping...");
        }
    }

    stop.store(true, Ordering::SeqCst);
    let stats = task
        .await
        .context("Pipeline task panicked")?
        .context("Pipeline execution failed")?;
    report(&stats);

    info!("Frame Syncer finished");
    Ok(())
}

fn report(stats: &crate::pipeline::PipelineStats) {
    info!(
        framesets_matched = stats.framesets_matched,
        framesets_consumed = stats.framesets_consumed,
        framesets_dropped = stats.framesets_dropped,
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Pipeline completed successfully"
    );
    stats.print_summary();
}

/// Setup Ctrl+C and SIGTERM signal handlers
///
/// A handler that cannot be installed never fires.
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(sdk: &contracts::SdkConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Archive:");
    println!(
        "  Max published per stream: {}",
        sdk.archive.max_published_per_stream
    );
    println!("  Drain timeout: {}s", sdk.archive.drain_timeout_s);
    println!("\nQueue:");
    println!("  Capacity: {}", sdk.queue.capacity);
    println!("  Keep frames: {}", sdk.queue.keep_frames);
    println!("\nSyncer:");
    println!("  Key stream: {}", sdk.syncer.key_stream);
    println!("  Lane capacity: {}", sdk.syncer.lane_capacity);

    println!("\nStreams ({}):", sdk.streams.len());
    for stream in &sdk.streams {
        match (stream.width, stream.height) {
            (Some(w), Some(h)) => println!(
                "  - {} ({}, {}x{} @ {} fps)",
                stream.stream, stream.format, w, h, stream.fps
            ),
            _ => println!("  - {} ({} @ {} fps)", stream.stream, stream.format, stream.fps),
        }
    }

    println!();
}
