//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::FramesetSummary;
use serde::Serialize;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Framesets matched by the syncer
    pub framesets_matched: u64,

    /// Framesets taken off the output queue by the consumer
    pub framesets_consumed: u64,

    /// Framesets evicted by the output queue
    pub framesets_dropped: u64,

    /// Framesets the archive had no slot to wrap
    pub composites_refused: u64,

    /// Frames published by the mock streams
    pub frames_produced: u64,

    /// Frames the archive refused to publish
    pub frames_refused: u64,

    /// Frames skipped or evicted inside the syncer
    pub syncer_dropped: u64,

    /// Total duration of the run
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,

    /// Number of configured streams
    pub active_streams: usize,

    /// Completeness and alignment summary
    pub framesets: FramesetSummary,
}

fn as_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl PipelineStats {
    /// Consumed framesets per second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.framesets_consumed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of matched framesets that never reached the consumer (%)
    pub fn drop_rate(&self) -> f64 {
        if self.framesets_matched > 0 {
            (self.framesets_dropped + self.composites_refused) as f64
                / self.framesets_matched as f64
                * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Active streams: {}", self.active_streams);
        println!("   ├─ Frames produced: {}", self.frames_produced);
        println!("   ├─ Frames refused by archive: {}", self.frames_refused);
        println!("   └─ Frames dropped in syncer: {}", self.syncer_dropped);

        println!("\n🔗 Framesets");
        println!("   ├─ Matched: {}", self.framesets_matched);
        println!("   ├─ Consumed: {} ({:.2}/s)", self.framesets_consumed, self.fps());
        println!(
            "   ├─ Dropped by queue: {} (refused composites: {})",
            self.framesets_dropped, self.composites_refused
        );
        println!("   └─ Drop rate: {:.2}%", self.drop_rate());

        println!("\n{}", self.framesets);
    }
}
