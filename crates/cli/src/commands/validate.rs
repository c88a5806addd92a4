//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::SdkConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    key_stream: String,
    stream_count: usize,
    queue_capacity: usize,
    lane_capacity: usize,
    max_published_per_stream: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(sdk) => {
            let warnings = collect_warnings(&sdk);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    key_stream: sdk.syncer.key_stream.to_string(),
                    stream_count: sdk.streams.len(),
                    queue_capacity: sdk.queue.capacity,
                    lane_capacity: sdk.syncer.lane_capacity,
                    max_published_per_stream: sdk.archive.max_published_per_stream,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(sdk: &SdkConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if sdk.streams.is_empty() {
        warnings.push("No streams configured - `run` will not produce framesets".to_string());
        return warnings;
    }

    // Streams faster than the key stream overflow their lane between key frames
    let key_fps = sdk
        .streams
        .iter()
        .find(|s| s.stream == sdk.syncer.key_stream)
        .map(|s| s.fps);
    if let Some(key_fps) = key_fps {
        for stream in &sdk.streams {
            let per_key_frame = stream.fps.div_ceil(key_fps) as usize;
            if per_key_frame > sdk.syncer.lane_capacity {
                warnings.push(format!(
                    "Stream '{}' delivers {} frames per key frame but lane_capacity is {} - \
                     older frames will be evicted",
                    stream.stream, per_key_frame, sdk.syncer.lane_capacity
                ));
            }
        }
    }

    // Every stream pins a full lane, the lane's front slot and the queued framesets
    let pinned = sdk.syncer.lane_capacity + 1 + sdk.queue.capacity;
    if !sdk.queue.keep_frames && sdk.archive.max_published_per_stream < pinned {
        warnings.push(format!(
            "archive.max_published_per_stream ({}) is below lane_capacity + 1 + queue.capacity ({}) - \
             the archive may refuse frames",
            sdk.archive.max_published_per_stream, pinned
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Key stream: {}", summary.key_stream);
            println!("  Streams: {}", summary.stream_count);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Lane capacity: {}", summary.lane_capacity);
            println!(
                "  Max published per stream: {}",
                summary.max_published_per_stream
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
