//! Frameset 指标收集模块
//!
//! 消费端对同步结果的统计：完整性、对齐误差与延迟。

use std::collections::BTreeMap;

use contracts::{host_time_ms, StreamId};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use syncer::FrameSet;

/// 记录一个交付给消费者的 frameset
///
/// `expected` 为配置的全部流，缺失的流单独计数。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_frameset_delivered;
///
/// let set = syncer.wait_for_frames(timeout);
/// record_frameset_delivered(&set, &expected);
/// ```
pub fn record_frameset_delivered(set: &FrameSet, expected: &[StreamId]) {
    counter!("frameset_delivered_total").increment(1);

    let missing: Vec<_> = expected.iter().filter(|s| !set.contains(**s)).collect();
    gauge!("frameset_streams_missing").set(missing.len() as f64);
    if !missing.is_empty() {
        counter!("frameset_incomplete_total").increment(1);
        for stream in missing {
            counter!("frameset_stream_missing_total", "stream" => stream.to_string()).increment(1);
        }
    }

    if let Some(key) = set.key_frame() {
        gauge!("frameset_last_frame_number").set(key.frame_number() as f64);
        record_delivery_latency_ms(host_time_ms() - key.system_time());
    }
}

/// 记录从帧到达主机到被消费的延迟
pub fn record_delivery_latency_ms(latency_ms: f64) {
    histogram!("frameset_delivery_latency_ms").record(latency_ms.max(0.0));
}

/// 记录队列深度
pub fn record_queue_depth(queue: &str, depth: usize) {
    gauge!("frame_queue_depth", "queue" => queue.to_string()).set(depth as f64);
}

/// Frameset 聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct FramesetAggregator {
    /// 期望出现的流
    expected: Vec<StreamId>,

    /// 总 frameset 数
    pub total_framesets: u64,

    /// 缺流的 frameset 数
    pub incomplete_framesets: u64,

    /// frameset 大小统计
    pub size_stats: RunningStats,

    /// 各流对齐误差 (ms)
    pub alignment_stats: BTreeMap<StreamId, RunningStats>,

    /// 各流缺失次数
    pub missing_counts: BTreeMap<StreamId, u64>,

    /// 交付延迟 (ms)
    pub latency_stats: RunningStats,
}

impl FramesetAggregator {
    /// 创建新的聚合器
    pub fn new(expected: impl IntoIterator<Item = StreamId>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            ..Default::default()
        }
    }

    /// 更新聚合统计；空 frameset 不计入
    pub fn update(&mut self, set: &FrameSet) {
        if set.is_empty() {
            return;
        }
        self.total_framesets += 1;
        self.size_stats.push(set.len() as f64);

        let mut complete = true;
        for stream in &self.expected {
            if !set.contains(*stream) {
                complete = false;
                *self.missing_counts.entry(*stream).or_insert(0) += 1;
            }
        }
        if !complete {
            self.incomplete_framesets += 1;
        }

        for (stream, error) in set.alignment_errors() {
            self.alignment_stats.entry(stream).or_default().push(error);
        }

        if let Some(key) = set.key_frame() {
            self.latency_stats
                .push((host_time_ms() - key.system_time()).max(0.0));
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> FramesetSummary {
        FramesetSummary {
            total_framesets: self.total_framesets,
            incomplete_framesets: self.incomplete_framesets,
            complete_rate: if self.total_framesets > 0 {
                (self.total_framesets - self.incomplete_framesets) as f64
                    / self.total_framesets as f64
                    * 100.0
            } else {
                0.0
            },
            frameset_size: StatsSummary::from(&self.size_stats),
            delivery_latency_ms: StatsSummary::from(&self.latency_stats),
            alignment_error_ms: self
                .alignment_stats
                .iter()
                .map(|(stream, stats)| (stream.to_string(), StatsSummary::from(stats)))
                .collect(),
            stream_missing_counts: self
                .missing_counts
                .iter()
                .map(|(stream, count)| (stream.to_string(), *count))
                .collect(),
        }
    }

    /// 重置统计，保留期望的流
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.expected));
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct FramesetSummary {
    pub total_framesets: u64,
    pub incomplete_framesets: u64,
    pub complete_rate: f64,
    pub frameset_size: StatsSummary,
    pub delivery_latency_ms: StatsSummary,
    pub alignment_error_ms: BTreeMap<String, StatsSummary>,
    pub stream_missing_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for FramesetSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Frameset Summary ===")?;
        writeln!(f, "Total framesets: {}", self.total_framesets)?;
        writeln!(
            f,
            "Incomplete framesets: {} (complete {:.2}%)",
            self.incomplete_framesets, self.complete_rate
        )?;
        writeln!(f, "Frameset size: {}", self.frameset_size)?;
        writeln!(f, "Delivery latency (ms): {}", self.delivery_latency_ms)?;

        if !self.alignment_error_ms.is_empty() {
            writeln!(f, "Alignment error (ms):")?;
            for (stream, stats) in &self.alignment_error_ms {
                writeln!(f, "  {}: {}", stream, stats)?;
            }
        }

        if !self.stream_missing_counts.is_empty() {
            writeln!(f, "Missing stream counts:")?;
            for (stream, count) in &self.stream_missing_counts {
                writeln!(f, "  {}: {}", stream, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
