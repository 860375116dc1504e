//! 🎬 *[a channel fills with batches. somewhere, a sink waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 🗑️ The SinkWorker — patient, tireless, and deeply unbothered by the chaos upstream.
//! It receives batches. It sinks them. Then, and only then, it commits their checkpoints.
//! A crash between the two replays the batch. That's at-least-once, and it's on purpose.
//!
//! 🦆 (the duck has no comment at this time)

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Worker;
use crate::checkpoint::{CheckpointBackend, CheckpointBackendKind};
use crate::common::RecordBatch;
use crate::progress::ProgressMetrics;
use crate::sinks::{Sink, SinkBackend};

/// 🗑️ Takes batches from a channel, throws records into a sink, commits the checkpoints.
#[derive(Debug)]
pub(crate) struct SinkWorker {
    rx: Receiver<RecordBatch>,
    sink: SinkBackend,
    checkpoints: CheckpointBackendKind,
    progress: ProgressMetrics,
}

impl SinkWorker {
    pub(crate) fn new(
        rx: Receiver<RecordBatch>,
        sink: SinkBackend,
        checkpoints: CheckpointBackendKind,
        progress: ProgressMetrics,
    ) -> Self {
        Self {
            rx,
            sink,
            checkpoints,
            progress,
        }
    }
}

impl Worker for SinkWorker {
    /// 🔢 Records written.
    type Output = u64;

    fn start(mut self) -> JoinHandle<Result<u64>> {
        tokio::spawn(async move {
            debug!("📥 SinkWorker started draining channel...");
            loop {
                match self.rx.recv().await {
                    Ok(batch) => {
                        let RecordBatch {
                            records,
                            checkpoints,
                        } = batch;
                        let the_bytes: usize = records.iter().map(|record| record.value.len()).sum();
                        let the_count = records.len() as u64;
                        debug!("🪣 SinkWorker received batch of {the_count} record(s)");

                        if !records.is_empty() {
                            self.sink
                                .receive(records)
                                .await
                                .context("SinkWorker failed to write a batch")?;
                        }
                        if !checkpoints.is_empty() {
                            self.checkpoints
                                .write_many(&checkpoints)
                                .await
                                .context("SinkWorker failed to commit checkpoints")?;
                        }
                        self.progress.update(the_bytes as u64, the_count);
                    }
                    Err(_) => {
                        // Channel is empty and closed
                        self.progress.finish();
                        self.sink
                            .close()
                            .await
                            .context("SinkWorker failed to close sink")?;
                        info!(
                            "🏁 SinkWorker: channel closed after {} record(s). Shutting down.",
                            self.progress.total_records()
                        );
                        return Ok(self.progress.total_records());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointEntry, InMemoryCheckpointBackend};
    use crate::common::{RecordValue, SourceRecord};
    use crate::sinks::InMemorySink;
    use crate::template::Context as KeyContext;

    fn the_record(key: &str, count: u64) -> SourceRecord {
        let context = KeyContext::for_key(key);
        let mut checkpoint = CheckpointEntry::new("bucket", &context);
        for _ in 0..count {
            checkpoint.increment_record_count();
        }
        SourceRecord {
            object_key: key.to_string(),
            object_size: 3,
            context,
            checkpoint,
            value: RecordValue::Text("abc".to_string()),
        }
    }

    #[tokio::test]
    async fn the_one_where_records_land_before_checkpoints_commit() {
        let the_sink = InMemorySink::new();
        let the_backend = InMemoryCheckpointBackend::new();
        let (tx, rx) = async_channel::bounded(4);

        let the_handle = SinkWorker::new(
            rx,
            SinkBackend::InMemory(the_sink.clone()),
            CheckpointBackendKind::InMemory(the_backend.clone()),
            ProgressMetrics::new("test".to_string(), false),
        )
        .start();

        let the_batch_record = the_record("a.txt", 1);
        tx.send(RecordBatch {
            checkpoints: vec![the_batch_record.checkpoint.clone()],
            records: vec![the_batch_record],
        })
        .await
        .expect("💀 send");
        drop(tx);

        let the_written = the_handle.await.expect("💀 panicked").expect("💀 failed");
        assert_eq!(the_written, 1);
        assert_eq!(the_sink.records().await.len(), 1);
        assert!(the_sink.is_closed());
        let the_committed = the_backend.snapshot().await;
        assert_eq!(the_committed.len(), 1);
        assert_eq!(the_committed[0].record_count(), 1);
        assert_eq!(the_backend.write_many_calls(), 1);
    }

    #[tokio::test]
    async fn the_one_where_checkpoint_only_batches_still_commit() {
        let the_backend = InMemoryCheckpointBackend::new();
        let (tx, rx) = async_channel::bounded(4);
        let the_handle = SinkWorker::new(
            rx,
            SinkBackend::InMemory(InMemorySink::new()),
            CheckpointBackendKind::InMemory(the_backend.clone()),
            ProgressMetrics::new("test".to_string(), false),
        )
        .start();

        let mut the_done = CheckpointEntry::new("bucket", &KeyContext::for_key("a.txt"));
        the_done.mark_completed();
        tx.send(RecordBatch {
            records: Vec::new(),
            checkpoints: vec![the_done],
        })
        .await
        .expect("💀 send");
        drop(tx);

        assert_eq!(the_handle.await.expect("💀 panicked").expect("💀 failed"), 0);
        assert!(the_backend.snapshot().await[0].is_completed());
    }
}
