//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce the [`SdkConfig`] every runtime crate is built from
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("key stream: {}", config.syncer.key_stream);
//! ```

mod parser;
mod validator;

pub use contracts::SdkConfig;
pub use parser::ConfigFormat;

use contracts::FrameError;
use std::path::Path;
use tracing::debug;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Format comes from the file extension (.toml / .json); files without
    /// an extension are sniffed from their content.
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SdkConfig, FrameError> {
        let content = Self::read_file(path)?;
        let format = Self::detect_format(path, &content)?;
        let config = Self::load_from_str(&content, format)?;
        debug!(
            path = %path.display(),
            streams = config.streams.len(),
            key_stream = %config.syncer.key_stream,
            "config loaded"
        );
        Ok(config)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<SdkConfig, FrameError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already built configuration
    pub fn validate(config: &SdkConfig) -> Result<(), FrameError> {
        validator::validate(config)
    }

    /// Serialize SdkConfig to TOML string
    pub fn to_toml(config: &SdkConfig) -> Result<String, FrameError> {
        toml::to_string_pretty(config)
            .map_err(|e| FrameError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SdkConfig to JSON string
    pub fn to_json(config: &SdkConfig) -> Result<String, FrameError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| FrameError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from the extension, or the content when
    /// there is none
    fn detect_format(path: &Path, content: &str) -> Result<ConfigFormat, FrameError> {
        match path.extension().and_then(|e| e.to_str()) {
            None => Ok(ConfigFormat::sniff(content)),
            Some(ext) => ConfigFormat::from_path(path).ok_or_else(|| {
                FrameError::config_parse(format!("unsupported config format: .{ext}"))
            }),
        }
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, FrameError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(content: &str, format: ConfigFormat) -> Result<SdkConfig, FrameError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}
