//! 配置解析模块
//!
//! TOML 为主，JSON 可选。解析错误带上 `line:column`，
//! 方便直接定位到配置文件中的出错位置。

use std::path::Path;

use contracts::{FrameError, SdkConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 从路径推断格式，没有扩展名时返回 `None`
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// 按内容猜测：首个非空白字符为 `{` 视为 JSON
    pub fn sniff(content: &str) -> Self {
        match content.trim_start().chars().next() {
            Some('{') => Self::Json,
            _ => Self::Toml,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// 根据格式解析配置
///
/// # Errors
/// `ConfigParse`，消息中包含出错的行列号 (可得时)
pub fn parse(content: &str, format: ConfigFormat) -> Result<SdkConfig, FrameError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| {
            let location = e.span().map(|span| line_column(content, span.start));
            parse_error(format, location, e.message().trim().to_string(), e)
        }),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| {
            let location = (e.line() > 0).then(|| (e.line(), e.column()));
            parse_error(format, location, e.to_string(), e)
        }),
    }
}

fn parse_error(
    format: ConfigFormat,
    location: Option<(usize, usize)>,
    message: String,
    source: impl std::error::Error + Send + Sync + 'static,
) -> FrameError {
    let message = match location {
        Some((line, column)) => format!("{} error at {line}:{column}: {message}", format.name()),
        None => format!("{} error: {message}", format.name()),
    };
    FrameError::ConfigParse {
        message,
        source: Some(Box::new(source)),
    }
}

/// 字节偏移 → 1 起始的 (行, 列)
fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let prefix = content.get(..offset).unwrap_or(content);
    let line = prefix.matches('\n').count() + 1;
    let column = prefix
        .rfind('\n')
        .map_or(prefix.chars().count(), |nl| prefix[nl + 1..].chars().count())
        + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{PixelFormat, StreamId, StreamKind};

    #[test]
    fn test_parse_toml_defaults() {
        let content = r#"
[syncer]
key_stream = "depth"

[[streams]]
stream = "depth"
format = "z16"
fps = 30
width = 640
height = 480
"#;
        let config = parse(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.syncer.key_stream, StreamId::from(StreamKind::Depth));
        assert_eq!(config.syncer.lane_capacity, 4);
        assert_eq!(config.queue.capacity, 1);
        assert_eq!(config.archive.max_published_per_stream, 32);
        assert_eq!(config.streams[0].format, PixelFormat::Z16);
        assert_eq!(config.streams[0].depth_units, 0.001);
    }

    #[test]
    fn test_parse_json_streams() {
        let content = r#"{
            "queue": { "capacity": 8, "keep_frames": true },
            "syncer": { "key_stream": "infrared:1", "lane_capacity": 2 },
            "streams": [
                { "stream": "infrared:1", "format": "y8", "fps": 60, "width": 848, "height": 480 },
                { "stream": "gyro", "format": "motion_xyz32f", "fps": 200 }
            ]
        }"#;
        let config = parse(content, ConfigFormat::Json).unwrap();
        assert!(config.queue.keep_frames);
        assert_eq!(config.syncer.key_stream, StreamId::new(StreamKind::Infrared, 1));
        assert_eq!(config.streams[1].width, None);
    }

    #[test]
    fn test_toml_error_has_location() {
        let content = "[queue]\ncapacity = 4\n\n[syncer]\nkey_stream = \"lidar\"\n";
        let err = parse(content, ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, FrameError::ConfigParse { .. }));
        assert!(err.to_string().contains("TOML error at 5:"), "{err}");
    }

    #[test]
    fn test_json_error_has_location() {
        let content = "{\n  \"queue\": { \"capacity\": \"four\" }\n}";
        let err = parse(content, ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("JSON error at 2:"), "{err}");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_line_column() {
        let content = "ab\ncdé\nf";
        assert_eq!(line_column(content, 0), (1, 1));
        assert_eq!(line_column(content, 4), (2, 2));
        assert_eq!(line_column(content, content.len()), (3, 2));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
        assert_eq!(
            ConfigFormat::from_path(Path::new("cfg/sdk.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("sdk")), None);
        assert_eq!(ConfigFormat::sniff("  \n{ }"), ConfigFormat::Json);
        assert_eq!(ConfigFormat::sniff("[queue]"), ConfigFormat::Toml);
    }
}
