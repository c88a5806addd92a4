//! Layered error definitions
//!
//! Categorized by source: frame / metadata / wait / config

use thiserror::Error;

use crate::{MetadataAttribute, StreamId};

/// Error category, used by callers that only care about the class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input (foreign pool slot, unsupported pixel depth, out-of-range pixel)
    InvalidArgument,
    /// Operation issued before its precondition was met
    WrongCallSequence,
    /// Metadata attribute not supported for this stream/frame
    NotApplicable,
    /// A blocking wait exceeded its deadline
    Timeout,
    /// Configuration could not be parsed or is invalid
    Config,
    /// Underlying IO failure
    Io,
}

/// Unified error type
#[derive(Debug, Error)]
pub enum FrameError {
    // ===== Argument / Sequence Errors =====
    /// Invalid argument
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Wrong call sequence
    #[error("wrong call sequence: {message}")]
    WrongCallSequence { message: String },

    // ===== Metadata Errors =====
    /// No parser table attached to the frame
    #[error("metadata not available for stream '{stream}'")]
    MetadataUnavailable { stream: String },

    /// Attribute exists in the registry but no parser could serve it
    #[error("metadata attribute '{attribute}' is not applicable for stream '{stream}'")]
    MetadataNotApplicable {
        attribute: MetadataAttribute,
        stream: String,
    },

    // ===== Wait Errors =====
    /// Wait timeout
    #[error("timeout: waited {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Create invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create wrong call sequence error
    pub fn wrong_call_sequence(message: impl Into<String>) -> Self {
        Self::WrongCallSequence {
            message: message.into(),
        }
    }

    /// Create metadata unavailable error
    pub fn metadata_unavailable(stream: Option<StreamId>) -> Self {
        Self::MetadataUnavailable {
            stream: stream_label(stream),
        }
    }

    /// Create metadata not applicable error
    pub fn metadata_not_applicable(attribute: MetadataAttribute, stream: Option<StreamId>) -> Self {
        Self::MetadataNotApplicable {
            attribute,
            stream: stream_label(stream),
        }
    }

    /// Create timeout error from the waited duration
    pub fn timeout(waited: std::time::Duration) -> Self {
        Self::Timeout {
            waited_ms: waited.as_millis() as u64,
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::WrongCallSequence { .. } | Self::MetadataUnavailable { .. } => {
                ErrorKind::WrongCallSequence
            }
            Self::MetadataNotApplicable { .. } => ErrorKind::NotApplicable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this is a wait timeout
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

fn stream_label(stream: Option<StreamId>) -> String {
    stream.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}
