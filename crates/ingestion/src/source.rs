//! 流数据源 trait

use std::sync::Arc;

use contracts::{StreamId, StreamProfile};
use frame_queue::FrameSink;

use crate::Result;

/// 流数据源
///
/// 每个源在自己的投递线程上产生帧，发布到 archive 后推入 `sink`。
pub trait StreamSource: Send + Sync {
    /// 流 ID
    fn stream(&self) -> StreamId;

    /// 流描述
    fn profile(&self) -> Arc<StreamProfile>;

    /// 开始投递
    ///
    /// # Errors
    /// 已在监听时返回 `AlreadyListening`。
    fn listen(&self, sink: Arc<dyn FrameSink>) -> Result<()>;

    /// 停止投递，返回后不再有新帧进入 sink
    fn stop(&self);

    /// 是否正在监听
    fn is_listening(&self) -> bool;
}
