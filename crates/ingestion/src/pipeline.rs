//! Ingestion Pipeline main entry

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use archive::FrameArchive;
use contracts::{StreamConfig, StreamId, StreamProfile};
use frame_queue::FrameSink;
use tracing::{debug, info, instrument, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};
use crate::mock::MockStreamSource;
use crate::source::StreamSource;

/// Ingestion Pipeline
///
/// Owns the registered stream sources and starts them against one sink.
/// Sources are stopped when the pipeline is dropped.
pub struct IngestionPipeline {
    /// Registered sources, ordered by stream
    sources: BTreeMap<StreamId, Box<dyn StreamSource>>,

    /// Shared metrics of the mock sources built by this pipeline
    metrics: Arc<IngestionMetrics>,
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionPipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Build one mock source per stream config, all sharing one epoch
    ///
    /// # Errors
    /// The first invalid or duplicate stream config.
    pub fn from_configs(streams: &[StreamConfig], archive: &Arc<FrameArchive>) -> Result<Self> {
        let mut pipeline = Self::new();
        let epoch = Instant::now();
        for config in streams {
            let source = MockStreamSource::new(config.clone(), archive.clone(), epoch)?
                .with_metrics(pipeline.metrics.clone());
            pipeline.register(Box::new(source))?;
        }
        Ok(pipeline)
    }

    /// Register a stream source
    ///
    /// # Errors
    /// `DuplicateStream` when a source for the same stream exists.
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(stream = %source.stream())
    )]
    pub fn register(&mut self, source: Box<dyn StreamSource>) -> Result<()> {
        let stream = source.stream();
        if self.sources.contains_key(&stream) {
            return Err(IngestionError::DuplicateStream { stream });
        }
        debug!(stream = %stream, "registered stream source");
        self.sources.insert(stream, source);
        Ok(())
    }

    /// Start every source that is not yet listening
    ///
    /// # Errors
    /// If any source fails to start, every source is stopped again.
    #[instrument(name = "ingestion_start_all", skip(self, sink))]
    pub fn start_all(&self, sink: Arc<dyn FrameSink>) -> Result<()> {
        info!(count = self.sources.len(), "starting all stream sources");
        for (stream, source) in &self.sources {
            if source.is_listening() {
                continue;
            }
            debug!(stream = %stream, "starting source");
            if let Err(e) = source.listen(sink.clone()) {
                warn!(stream = %stream, error = %e, "source failed to start");
                self.stop_all();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop all sources; returns once no source delivers anymore
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.sources.len(), "stopping all stream sources");
        for (stream, source) in &self.sources {
            if source.is_listening() {
                debug!(stream = %stream, "stopping source");
                source.stop();
            }
        }
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.sources.keys().copied()
    }

    /// Profiles of every registered source
    pub fn profiles(&self) -> Vec<Arc<StreamProfile>> {
        self.sources.values().map(|source| source.profile()).collect()
    }

    /// Check if the source of a stream is listening
    pub fn is_listening(&self, stream: StreamId) -> bool {
        self.sources
            .get(&stream)
            .is_some_and(|source| source.is_listening())
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}
