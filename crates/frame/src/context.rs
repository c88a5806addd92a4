//! FrameContext - process-scoped parser registry
//!
//! Built once through [`FrameContextBuilder`], then shared read-only behind an
//! `Arc` by every owner that publishes frames.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{MetadataAttribute, StreamKind};

use crate::{BlobParser, HeaderParser, MetadataParser, MetadataParserMap, ProfileFpsParser};

/// Attributes every stream serves from its header
const HEADER_ATTRIBUTES: [MetadataAttribute; 4] = [
    MetadataAttribute::FrameCounter,
    MetadataAttribute::FrameTimestamp,
    MetadataAttribute::TimeOfArrival,
    MetadataAttribute::BackendTimestamp,
];

/// Attributes image streams carry in their metadata blob
const IMAGE_BLOB_ATTRIBUTES: [MetadataAttribute; 5] = [
    MetadataAttribute::SensorTimestamp,
    MetadataAttribute::ActualExposure,
    MetadataAttribute::GainLevel,
    MetadataAttribute::AutoExposure,
    MetadataAttribute::WhiteBalance,
];

/// Read-only registry of parser tables per stream kind
#[derive(Debug, Default)]
pub struct FrameContext {
    tables: HashMap<StreamKind, Arc<MetadataParserMap>>,
}

impl FrameContext {
    pub fn builder() -> FrameContextBuilder {
        FrameContextBuilder::default()
    }

    /// Context with the standard tables for every stream kind
    pub fn standard() -> Arc<Self> {
        let mut builder = Self::builder();
        for kind in StreamKind::ALL {
            builder = builder.with_standard_parsers(kind);
        }
        builder.build()
    }

    /// Parser table for a stream kind
    pub fn parsers_for(&self, kind: StreamKind) -> Option<Arc<MetadataParserMap>> {
        self.tables.get(&kind).cloned()
    }

    pub fn stream_kinds(&self) -> impl Iterator<Item = StreamKind> + '_ {
        self.tables.keys().copied()
    }
}

/// Single-use builder for [`FrameContext`]
#[derive(Debug, Default)]
pub struct FrameContextBuilder {
    tables: HashMap<StreamKind, MetadataParserMap>,
}

impl FrameContextBuilder {
    /// Append a parser for one attribute of one stream kind
    pub fn register(
        mut self,
        kind: StreamKind,
        attribute: MetadataAttribute,
        parser: impl MetadataParser + 'static,
    ) -> Self {
        self.tables
            .entry(kind)
            .or_default()
            .register(attribute, parser);
        self
    }

    /// Header attributes and fps for all kinds, blob attributes for image kinds
    pub fn with_standard_parsers(mut self, kind: StreamKind) -> Self {
        let table = self.tables.entry(kind).or_default();
        for attribute in HEADER_ATTRIBUTES {
            if let Some(parser) = HeaderParser::new(attribute) {
                table.register(attribute, parser);
            }
        }
        if kind.is_video() {
            for attribute in IMAGE_BLOB_ATTRIBUTES {
                table.register(attribute, BlobParser::new(attribute));
            }
        }
        table.register(MetadataAttribute::ActualFps, ProfileFpsParser);
        // Blob-reported fps serves frames published without a profile
        table.register(
            MetadataAttribute::ActualFps,
            BlobParser::new(MetadataAttribute::ActualFps),
        );
        self
    }

    /// Keep a kind without any parser table (metadata unavailable)
    pub fn without_parsers(mut self, kind: StreamKind) -> Self {
        self.tables.remove(&kind);
        self
    }

    pub fn build(self) -> Arc<FrameContext> {
        Arc::new(FrameContext {
            tables: self
                .tables
                .into_iter()
                .map(|(kind, table)| (kind, Arc::new(table)))
                .collect(),
        })
    }
}
