//! 元数据解析器
//!
//! 一个属性可以注册多个解析器（同一传感器的不同流由不同子系统产生同名属性），
//! 查询时按注册顺序取第一个 `supports()` 且 `get()` 成功的解析器。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use contracts::{FrameError, MetadataAttribute, MetadataValue};

use crate::Frame;

/// 元数据解析器
pub trait MetadataParser: Send + Sync {
    /// 该帧是否能提供此属性
    fn supports(&self, frame: &Frame) -> bool;

    /// 读取属性值
    fn get(&self, frame: &Frame) -> Result<MetadataValue, FrameError>;
}

/// 从帧头读取的属性
///
/// 帧号、时间戳 (usec)、到达时间与后端时间，总是可用。
#[derive(Debug, Clone, Copy)]
pub struct HeaderParser {
    attribute: MetadataAttribute,
}

impl HeaderParser {
    /// 仅支持帧头中存在的属性，其他返回 `None`
    pub fn new(attribute: MetadataAttribute) -> Option<Self> {
        match attribute {
            MetadataAttribute::FrameCounter
            | MetadataAttribute::FrameTimestamp
            | MetadataAttribute::TimeOfArrival
            | MetadataAttribute::BackendTimestamp => Some(Self { attribute }),
            _ => None,
        }
    }
}

impl MetadataParser for HeaderParser {
    fn supports(&self, _frame: &Frame) -> bool {
        true
    }

    fn get(&self, frame: &Frame) -> Result<MetadataValue, FrameError> {
        let header = frame.header();
        let value = match self.attribute {
            MetadataAttribute::FrameCounter => header.frame_number as MetadataValue,
            MetadataAttribute::FrameTimestamp => (header.timestamp * 1000.0) as MetadataValue,
            MetadataAttribute::TimeOfArrival => header.system_time as MetadataValue,
            MetadataAttribute::BackendTimestamp => header.backend_time as MetadataValue,
            other => return Err(FrameError::metadata_not_applicable(other, frame.stream())),
        };
        Ok(value)
    }
}

/// 值修正函数（单位换算等）
pub type ValueModifier = fn(MetadataValue) -> MetadataValue;

/// 从帧携带的元数据块读取属性
#[derive(Clone, Copy)]
pub struct BlobParser {
    attribute: MetadataAttribute,
    modifier: Option<ValueModifier>,
}

impl BlobParser {
    pub fn new(attribute: MetadataAttribute) -> Self {
        Self {
            attribute,
            modifier: None,
        }
    }

    /// 读取后对值做修正
    pub fn with_modifier(attribute: MetadataAttribute, modifier: ValueModifier) -> Self {
        Self {
            attribute,
            modifier: Some(modifier),
        }
    }
}

impl fmt::Debug for BlobParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobParser")
            .field("attribute", &self.attribute)
            .field("modifier", &self.modifier.is_some())
            .finish()
    }
}

impl MetadataParser for BlobParser {
    fn supports(&self, frame: &Frame) -> bool {
        frame.metadata().contains(self.attribute)
    }

    fn get(&self, frame: &Frame) -> Result<MetadataValue, FrameError> {
        let value = frame
            .metadata()
            .get(self.attribute)
            .ok_or_else(|| FrameError::metadata_not_applicable(self.attribute, frame.stream()))?;
        Ok(self.modifier.map_or(value, |modify| modify(value)))
    }
}

/// 从流配置读取帧率
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileFpsParser;

impl MetadataParser for ProfileFpsParser {
    fn supports(&self, frame: &Frame) -> bool {
        frame.profile().is_some()
    }

    fn get(&self, frame: &Frame) -> Result<MetadataValue, FrameError> {
        frame
            .profile()
            .map(|p| p.fps as MetadataValue)
            .ok_or_else(|| {
                FrameError::metadata_not_applicable(MetadataAttribute::ActualFps, frame.stream())
            })
    }
}

/// 属性 → 解析器列表 (多重映射)
#[derive(Clone, Default)]
pub struct MetadataParserMap {
    parsers: HashMap<MetadataAttribute, Vec<Arc<dyn MetadataParser>>>,
}

impl fmt::Debug for MetadataParserMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<_> = self
            .parsers
            .iter()
            .map(|(attribute, list)| (*attribute, list.len()))
            .collect();
        counts.sort();
        f.debug_struct("MetadataParserMap")
            .field("parsers", &counts)
            .finish()
    }
}

impl MetadataParserMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加解析器，已有的解析器优先
    pub fn register(
        &mut self,
        attribute: MetadataAttribute,
        parser: impl MetadataParser + 'static,
    ) -> &mut Self {
        self.parsers
            .entry(attribute)
            .or_default()
            .push(Arc::new(parser));
        self
    }

    /// 第一个支持且读取成功的解析器的值
    pub fn get(
        &self,
        attribute: MetadataAttribute,
        frame: &Frame,
    ) -> Result<MetadataValue, FrameError> {
        self.parsers
            .get(&attribute)
            .into_iter()
            .flatten()
            .filter(|parser| parser.supports(frame))
            .find_map(|parser| parser.get(frame).ok())
            .ok_or_else(|| FrameError::metadata_not_applicable(attribute, frame.stream()))
    }

    /// 是否有解析器支持该属性
    pub fn supports(&self, attribute: MetadataAttribute, frame: &Frame) -> bool {
        self.parsers
            .get(&attribute)
            .is_some_and(|list| list.iter().any(|parser| parser.supports(frame)))
    }

    /// 已注册的属性
    pub fn attributes(&self) -> impl Iterator<Item = MetadataAttribute> + '_ {
        self.parsers.keys().copied()
    }

    /// 某属性的解析器数量
    pub fn parser_count(&self, attribute: MetadataAttribute) -> usize {
        self.parsers.get(&attribute).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}
