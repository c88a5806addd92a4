//! Ingestion 错误类型

use contracts::StreamId;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 流配置无法生成帧
    #[error("invalid stream config for {stream}: {message}")]
    InvalidStream {
        /// 流 ID
        stream: StreamId,
        /// 错误消息
        message: String,
    },

    /// 同一流重复注册
    #[error("stream {stream} is already registered")]
    DuplicateStream {
        /// 流 ID
        stream: StreamId,
    },

    /// 流已在监听
    #[error("stream {stream} is already listening")]
    AlreadyListening {
        /// 流 ID
        stream: StreamId,
    },

    /// 投递线程创建失败
    #[error("failed to spawn delivery thread for {stream}")]
    ThreadSpawn {
        /// 流 ID
        stream: StreamId,
        #[source]
        source: std::io::Error,
    },
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
