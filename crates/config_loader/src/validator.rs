//! 配置校验模块
//!
//! 先执行字段级规则 (`validator` derive)，再执行跨字段规则：
//! - stream id 唯一
//! - key_stream 必须在 streams 中 (streams 非空时)
//! - 视频流必须有 width / height
//! - depth_units > 0

use std::collections::HashSet;

use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};
use contracts::{FrameError, SdkConfig, StreamConfig};

/// 校验 SdkConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &SdkConfig) -> Result<(), FrameError> {
    validate_fields(config)?;
    validate_stream_ids(config)?;
    validate_key_stream(config)?;
    for (idx, stream) in config.streams.iter().enumerate() {
        validate_stream(idx, stream)?;
    }
    Ok(())
}

/// 字段级规则
fn validate_fields(config: &SdkConfig) -> Result<(), FrameError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_violation(&errors, "")
            .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
        FrameError::config_validation(field, message)
    })
}

/// 按字段路径排序后的第一个违规
fn first_violation(errors: &ValidationErrors, path: &str) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if path.is_empty() {
            field.to_string()
        } else {
            format!("{path}.{field}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| {
                let message = e
                    .message
                    .as_ref()
                    .map_or_else(|| format!("failed '{}' check", e.code), |m| m.to_string());
                (path, message)
            }),
            ValidationErrorsKind::Struct(inner) => first_violation(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_violation(inner, &format!("{path}[{idx}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// 校验 stream id 唯一性
fn validate_stream_ids(config: &SdkConfig) -> Result<(), FrameError> {
    let mut seen = HashSet::new();
    for (idx, stream) in config.streams.iter().enumerate() {
        if !seen.insert(stream.stream) {
            return Err(FrameError::config_validation(
                format!("streams[{idx}].stream"),
                format!("duplicate stream '{}'", stream.stream),
            ));
        }
    }
    Ok(())
}

/// 校验 key_stream 存在
fn validate_key_stream(config: &SdkConfig) -> Result<(), FrameError> {
    let key = config.syncer.key_stream;
    if config.streams.is_empty() || config.streams.iter().any(|s| s.stream == key) {
        return Ok(());
    }
    Err(FrameError::config_validation(
        "syncer.key_stream",
        format!("key stream '{key}' not found in streams"),
    ))
}

/// 校验单个流
fn validate_stream(idx: usize, stream: &StreamConfig) -> Result<(), FrameError> {
    if stream.stream.kind.is_video() {
        for (name, value) in [("width", stream.width), ("height", stream.height)] {
            if value.is_none_or(|v| v == 0) {
                return Err(FrameError::config_validation(
                    format!("streams[{idx}].{name}"),
                    format!("video stream '{}' needs a positive {name}", stream.stream),
                ));
            }
        }
    }

    if stream.depth_units.is_nan() || stream.depth_units <= 0.0 {
        return Err(FrameError::config_validation(
            format!("streams[{idx}].depth_units"),
            format!("depth_units must be > 0, got {}", stream.depth_units),
        ));
    }
    Ok(())
}
