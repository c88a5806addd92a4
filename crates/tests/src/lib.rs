//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（mock 流 → archive → syncer → 队列）
//! - 关闭时 archive 归零

#[cfg(test)]
mod contract_tests {
    use contracts::{SdkConfig, StreamId, StreamKind};

    #[test]
    fn test_contracts_compile() {
        // 验证默认配置可用
        let config = SdkConfig::default();
        assert!(config_loader::ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.syncer.key_stream, StreamId::from(StreamKind::Depth));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use archive::FrameArchive;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ArchiveConfig, MetadataAttribute, SdkConfig, SensorInfo, StreamId, StreamKind,
    };
    use frame::FrameContext;
    use frame_queue::FrameQueue;
    use ingestion::{gradient_value, IngestionPipeline, MockStreamSource};
    use observability::FramesetAggregator;
    use syncer::Syncer;

    const CONFIG: &str = r#"
[archive]
max_published_per_stream = 32
drain_timeout_s = 5

[queue]
capacity = 2

[syncer]
key_stream = "depth"
lane_capacity = 4

[[streams]]
stream = "depth"
format = "z16"
fps = 60
width = 8
height = 6

[[streams]]
stream = "color"
format = "rgb8"
fps = 60
width = 8
height = 6
timestamp_offset_ms = 1.5

[[streams]]
stream = "gyro"
format = "motion_xyz32f"
fps = 200
"#;

    fn load() -> SdkConfig {
        ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap()
    }

    fn archive_for(config: ArchiveConfig) -> Arc<FrameArchive> {
        FrameArchive::new(
            config,
            FrameContext::standard(),
            SensorInfo {
                name: "integration".to_string(),
                serial: "0001".to_string(),
            },
        )
    }

    /// Deterministic pipeline: sources produce by hand, no threads
    ///
    /// 验证完整的数据流：
    /// 1. MockStreamSource 生成帧并发布到 archive
    /// 2. Syncer 按 key stream 组装 frameset
    /// 3. frameset 包装为 composite 进入 FrameQueue
    /// 4. 队列满时丢弃最旧的 composite
    #[test]
    fn test_e2e_manual_pipeline() {
        let sdk = load();
        let archive = archive_for(sdk.archive.clone());
        let syncer = Syncer::with_config(&sdk.syncer);
        let queue = FrameQueue::with_config(&sdk.queue);

        let sources: Vec<MockStreamSource> = sdk
            .streams
            .iter()
            .map(|config| {
                MockStreamSource::new(config.clone(), archive.clone(), std::time::Instant::now())
                    .unwrap()
            })
            .collect();

        let expected: Vec<StreamId> = sdk.streams.iter().map(|s| s.stream).collect();
        let mut aggregator = FramesetAggregator::new(expected);

        for n in 1..=5 {
            for source in &sources {
                syncer.enqueue(source.produce(n).unwrap());
            }

            let set = syncer.poll_for_frames();
            assert_eq!(set.len(), 3, "frameset {n} incomplete");
            assert_eq!(set.key_frame().unwrap().frame_number(), n);

            let depth = set.get(StreamKind::Depth.into()).unwrap();
            assert_eq!(
                depth.get_distance(1, 2).unwrap(),
                gradient_value(1, 2, n) as f32 * 0.001
            );
            assert_eq!(
                depth
                    .get_frame_metadata(MetadataAttribute::FrameCounter)
                    .unwrap(),
                n as i64
            );

            aggregator.update(&set);
            queue.enqueue(set.into_composite(archive.clone()).unwrap());
        }

        // 只保留最新的两个 composite
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 3);
        let oldest = queue.poll_for_frame().unwrap();
        assert_eq!(oldest.frame_number(), 4);
        assert_eq!(oldest.embedded_count(), 3);
        drop(oldest);

        let summary = aggregator.summary();
        assert_eq!(summary.total_framesets, 5);
        assert_eq!(summary.incomplete_framesets, 0);

        // queue + composite children 是唯一剩下的引用
        assert_eq!(archive.in_use(), 1 + 3);
        queue.flush();
        syncer.flush();
        assert_eq!(archive.in_use(), 0);
        assert!(archive.flush().is_ok());
    }

    /// Threaded pipeline through IngestionPipeline, shut down in order
    #[test]
    fn test_e2e_threaded_pipeline_drains_archive() {
        let sdk = load();
        let archive = archive_for(sdk.archive.clone());
        let syncer = Arc::new(Syncer::with_config(&sdk.syncer));

        let ingestion = IngestionPipeline::from_configs(&sdk.streams, &archive).unwrap();
        assert_eq!(ingestion.source_count(), 3);
        ingestion.start_all(syncer.clone()).unwrap();

        let mut framesets = Vec::new();
        for _ in 0..200 {
            let set = syncer.wait_for_frames(Duration::from_millis(50));
            if !set.is_empty() {
                framesets.push(set);
            }
            if framesets.len() >= 5 {
                break;
            }
        }
        assert!(framesets.len() >= 5, "only {} framesets", framesets.len());
        assert!(framesets.iter().all(|set| set.contains(StreamKind::Depth.into())));

        ingestion.stop_all();
        assert!(!ingestion.is_listening(StreamKind::Depth.into()));
        drop(framesets);
        syncer.flush();

        assert!(archive.flush().is_ok());
        assert_eq!(archive.in_use(), 0);
        assert!(archive.is_stopped());

        let produced = ingestion.metrics().snapshot();
        assert!(produced.frames_produced >= 5);
    }

    /// Held frames exhaust the per-stream limit; releasing them recovers
    #[test]
    fn test_archive_limit_refuses_and_recovers() {
        let archive = archive_for(ArchiveConfig {
            max_published_per_stream: 2,
            drain_timeout_s: 1,
        });
        let gyro = MockStreamSource::gyro(archive.clone(), 100).unwrap();

        let first = gyro.produce(1).unwrap();
        let second = gyro.produce(2).unwrap();
        assert!(gyro.produce(3).is_none());
        assert_eq!(gyro.metrics().snapshot().frames_refused, 1);

        // keep 后不再计入上限
        first.keep();
        let third = gyro.produce(4).unwrap();
        assert_eq!(archive.published_count(StreamKind::Gyro.into()), 2);

        drop((first, second, third));
        assert_eq!(archive.in_use(), 0);
        assert!(archive.flush().is_ok());
        assert!(gyro.produce(5).is_none());
    }

    /// Frames still held at teardown make flush time out
    #[test]
    fn test_archive_flush_times_out_with_held_frame() {
        let archive = archive_for(ArchiveConfig {
            max_published_per_stream: 4,
            drain_timeout_s: 1,
        });
        let depth = MockStreamSource::depth(archive.clone(), 30, 4, 4).unwrap();
        let held = depth.produce(1).unwrap();

        let err = archive.flush().unwrap_err();
        assert_eq!(err.kind(), contracts::ErrorKind::Timeout);

        drop(held);
        assert_eq!(archive.in_use(), 0);
    }
}
