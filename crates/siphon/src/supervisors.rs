//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor builds everything from the config, wires the two workers together with a
//! bounded channel, waits for both, and prints what happened.
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::ObjectSource;
use crate::checkpoint::CheckpointStore;
use crate::iterator::{IteratorStats, SourceRecordIterator};
use crate::progress::summary_table;
use crate::transforms::Transformer;
use workers::{SinkWorker, SourceWorker, Worker};

/// 🧾 What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub stats: IteratorStats,
    pub records_written: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// 🍽️ The stats as a borderless two-column table.
    pub fn render(&self) -> String {
        summary_table(&self.stats, self.elapsed).to_string()
    }
}

/// 📦 Because even async tasks need someone hovering over them asking "is it done yet?"
pub(crate) struct Supervisor {
    app_config: AppConfig,
    stop: Arc<AtomicBool>,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig, stop: Arc<AtomicBool>) -> Self {
        Self { app_config, stop }
    }

    /// 🧵 Unleash the workers, then wait for both of them. The source worker's error wins
    /// when both fail; the sink error is usually just "the channel went away" fallout.
    pub(crate) async fn start_workers(&self) -> Result<RunSummary> {
        let the_start = Instant::now();
        let config = &self.app_config;

        let distribution = config
            .distribution
            .validate()
            .context("💀 The [distribution] section does not describe a valid task")?;
        info!(
            "🧩 task {} of {} ({} distribution)",
            distribution.task.task_id(),
            distribution.task.max_tasks(),
            config.distribution.mode
        );

        let source = config.source_config.build();
        let source_name = source.bucket().to_string();
        let checkpoints = config.checkpoint_config.build();
        let store = CheckpointStore::new(checkpoints.clone());
        let iterator = SourceRecordIterator::new(
            source,
            distribution,
            Transformer::new(&config.transform),
            store,
        );
        let sink = config
            .sink_config
            .build()
            .await
            .context("💀 Could not open the sink")?;

        let (tx, rx) = async_channel::bounded(config.runtime.queue_capacity.max(1));
        let progress = crate::progress::ProgressMetrics::new(source_name, config.runtime.show_progress);

        let sink_handle = SinkWorker::new(rx, sink, checkpoints, progress).start();
        let source_handle =
            SourceWorker::new(tx, iterator, config.runtime.clone(), self.stop.clone()).start();

        let source_result = source_handle
            .await
            .context("💀 SourceWorker panicked")?;
        let sink_result = sink_handle.await.context("💀 SinkWorker panicked")?;

        let stats = source_result?;
        let records_written = sink_result?;
        let summary = RunSummary {
            stats,
            records_written,
            elapsed: the_start.elapsed(),
        };
        info!("📊 run summary\n{}", summary.render());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::RuntimeConfig;
    use crate::backends::{InMemorySourceConfig, SourceConfig};
    use crate::checkpoint::CheckpointConfig;
    use crate::distribution::{DistributionConfig, DistributionMode};
    use crate::sinks::{FileSinkConfig, SinkConfig};
    use crate::transforms::{TransformConfig, TransformFormat};
    use std::collections::BTreeMap;

    fn the_config(dir: &std::path::Path, task_id: u32, max_tasks: u32) -> AppConfig {
        let objects: BTreeMap<String, String> = (0..6)
            .map(|partition| {
                (
                    format!("topic-a-{partition}-0000.txt"),
                    format!("p{partition} one\np{partition} two\n"),
                )
            })
            .collect();
        AppConfig {
            source_config: SourceConfig::InMemory(InMemorySourceConfig {
                bucket: "memory".to_string(),
                page_size: 4,
                objects,
            }),
            distribution: DistributionConfig {
                mode: DistributionMode::FilenamePartition,
                template: Some("{{topic}}-{{partition}}-{{start_offset}}.txt".to_string()),
                task_id,
                max_tasks,
                target_topic: None,
            },
            transform: TransformConfig {
                format: TransformFormat::Lines,
                ..TransformConfig::default()
            },
            checkpoint_config: CheckpointConfig::File {
                path: dir.join("checkpoints.json"),
            },
            sink_config: SinkConfig::File(FileSinkConfig {
                file_name: dir.join(format!("out-{task_id}.ndjson")).display().to_string(),
                append: true,
            }),
            runtime: RuntimeConfig {
                max_poll_records: 3,
                poll_interval_ms: 1,
                error_backoff_ms: 1,
                queue_capacity: 2,
                run_once: true,
                show_progress: false,
            },
        }
    }

    #[tokio::test]
    async fn the_one_where_a_second_run_has_nothing_left_to_say() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir");
        let the_config = the_config(the_dir.path(), 0, 1);

        let the_first = Supervisor::new(the_config.clone(), Arc::default())
            .start_workers()
            .await
            .expect("💀 first run failed");
        assert_eq!(the_first.records_written, 12);
        assert_eq!(the_first.stats.objects_completed, 6);

        let the_second = Supervisor::new(the_config, Arc::default())
            .start_workers()
            .await
            .expect("💀 second run failed");
        assert_eq!(the_second.records_written, 0);
        assert_eq!(the_second.stats.objects_fetched, 0);
        assert_eq!(the_second.stats.completed_skipped, 6);

        let the_lines = std::fs::read_to_string(the_dir.path().join("out-0.ndjson"))
            .expect("💀 sink output should exist");
        assert_eq!(the_lines.lines().count(), 12);
        assert!(the_first.render().contains("records emitted"));
    }

    #[tokio::test]
    async fn the_one_where_three_tasks_split_the_bucket_without_overlap() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir");
        let mut the_total = 0;
        for task_id in 0..3 {
            let the_summary = Supervisor::new(the_config(the_dir.path(), task_id, 3), Arc::default())
                .start_workers()
                .await
                .expect("💀 run failed");
            // -- 🎯 partitions 0..6 modulo 3 tasks: two partitions each, two lines per object
            assert_eq!(the_summary.records_written, 4);
            the_total += the_summary.records_written;
        }
        assert_eq!(the_total, 12);
    }

    #[tokio::test]
    async fn the_one_where_a_bad_task_id_never_starts_a_worker() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir");
        let the_result = Supervisor::new(the_config(the_dir.path(), 5, 3), Arc::default())
            .start_workers()
            .await;
        let the_message = format!("{:#}", the_result.expect_err("💀 task 5 of 3 should be rejected"));
        assert!(the_message.contains("[distribution]"));
    }
}
