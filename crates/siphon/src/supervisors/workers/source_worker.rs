//! 🎬 *[the poll loop wakes. "anything?" it asks the bucket. the bucket says nothing.]*
//! *[the poll loop sleeps ten seconds and asks again. this is its whole life.]*
//!
//! 🚰 The SourceWorker owns the iterator and turns it into batches:
//! - pull up to `max_poll_records` records,
//! - drain the dirty checkpoint entries that came with them,
//! - ship both as one `RecordBatch`.
//!
//! 🧠 Knowledge graph:
//! - Exhausted pass → sleep `poll_interval_ms`, re-arm, go again. `run_once` ends it instead.
//! - Retryable remote error → warn, ship what was already pulled, back off, re-arm.
//! - Anything else → ship what was already pulled, then return the error.
//! - The stop flag is checked between batches and during sleeps. Never mid-batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::app_config::RuntimeConfig;
use crate::common::{RecordBatch, SourceRecord};
use crate::iterator::{IteratorStats, SourceRecordIterator};

// -- 💤 sleeps are chopped into slices this long so Ctrl-C doesn't wait out a full poll interval
const STOP_CHECK_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub(crate) struct SourceWorker {
    tx: Sender<RecordBatch>,
    iterator: SourceRecordIterator,
    runtime: RuntimeConfig,
    stop: Arc<AtomicBool>,
}

impl SourceWorker {
    pub(crate) fn new(
        tx: Sender<RecordBatch>,
        iterator: SourceRecordIterator,
        runtime: RuntimeConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            tx,
            iterator,
            runtime,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// 📦 Pulls records into `records` until it is full (`Ok(false)`) or the pass is done (`Ok(true)`).
    async fn poll(&mut self, records: &mut Vec<SourceRecord>) -> crate::error::Result<bool> {
        let max_poll_records = self.runtime.max_poll_records.max(1);
        while records.len() < max_poll_records {
            match self.iterator.next().await? {
                Some(record) => records.push(record),
                None => return Ok(true),
            }
        }
        Ok(false)
    }

    async fn ship(&mut self, records: Vec<SourceRecord>) -> Result<()> {
        let batch = RecordBatch {
            records,
            checkpoints: self.iterator.take_dirty(),
        };
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            "📤 SourceWorker shipping {} record(s) and {} checkpoint(s)",
            batch.records.len(),
            batch.checkpoints.len()
        );
        self.tx
            .send(batch)
            .await
            .context("💀 SourceWorker could not hand a batch to the sink worker: the channel is closed")
    }

    async fn sleep_unless_stopped(&mut self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.stopped() {
            let slice = remaining.min(STOP_CHECK_SLICE);
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }
}

impl Worker for SourceWorker {
    type Output = IteratorStats;

    fn start(mut self) -> JoinHandle<Result<IteratorStats>> {
        tokio::spawn(async move {
            info!("🚰 SourceWorker started polling");
            let poll_interval = Duration::from_millis(self.runtime.poll_interval_ms);
            let error_backoff = Duration::from_millis(self.runtime.error_backoff_ms);

            while !self.stopped() {
                let mut records = Vec::new();
                match self.poll(&mut records).await {
                    Ok(exhausted) => {
                        self.ship(records).await?;
                        if exhausted {
                            if self.runtime.run_once {
                                info!("🏁 SourceWorker finished its single pass");
                                break;
                            }
                            debug!("💤 nothing new, sleeping {poll_interval:?}");
                            self.sleep_unless_stopped(poll_interval).await;
                            self.iterator.rearm();
                        }
                    }
                    Err(err) if err.is_retryable() => {
                        warn!("🔁 retryable error, backing off {error_backoff:?}: {err}");
                        self.ship(records).await?;
                        self.sleep_unless_stopped(error_backoff).await;
                        self.iterator.rearm();
                    }
                    Err(err) => {
                        error!("💀 SourceWorker giving up: {err}");
                        self.ship(records).await?;
                        return Err(err).context("SourceWorker failed to poll the iterator");
                    }
                }
            }

            info!("🛑 SourceWorker stopped");
            Ok(self.iterator.stats().clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemorySource, SourceBackend};
    use crate::checkpoint::{CheckpointBackendKind, CheckpointStore, InMemoryCheckpointBackend};
    use crate::distribution::DistributionConfig;
    use crate::transforms::{TransformConfig, TransformFormat, Transformer};

    fn test_runtime() -> RuntimeConfig {
        RuntimeConfig {
            max_poll_records: 2,
            poll_interval_ms: 1,
            error_backoff_ms: 1,
            queue_capacity: 16,
            run_once: true,
            show_progress: false,
        }
    }

    fn the_iterator(source: &InMemorySource) -> SourceRecordIterator {
        let distribution = DistributionConfig::default()
            .validate()
            .expect("💀 default distribution is valid");
        let transformer = Transformer::new(&TransformConfig {
            format: TransformFormat::Lines,
            ..TransformConfig::default()
        });
        let store = CheckpointStore::new(CheckpointBackendKind::InMemory(
            InMemoryCheckpointBackend::new(),
        ));
        SourceRecordIterator::new(SourceBackend::InMemory(source.clone()), distribution, transformer, store)
    }

    async fn drain(rx: async_channel::Receiver<RecordBatch>) -> Vec<RecordBatch> {
        let mut batches = Vec::new();
        while let Ok(batch) = rx.recv().await {
            batches.push(batch);
        }
        batches
    }

    #[tokio::test]
    async fn the_one_where_batches_respect_max_poll_records() {
        let the_source = InMemorySource::new("bucket", 10);
        the_source.put("a.txt", "1\n2\n3\n").await;
        the_source.put("b.txt", "4\n5\n").await;
        let (tx, rx) = async_channel::bounded(16);

        let the_stats = SourceWorker::new(tx, the_iterator(&the_source), test_runtime(), Arc::default())
            .start()
            .await
            .expect("💀 worker panicked")
            .expect("💀 worker failed");
        let the_batches = drain(rx).await;

        let the_sizes: Vec<usize> = the_batches.iter().map(|batch| batch.records.len()).collect();
        assert_eq!(the_sizes, vec![2, 2, 1]);
        assert_eq!(the_stats.records_emitted, 5);
        assert_eq!(the_stats.objects_completed, 2);

        // 🏁 both objects end up committed as completed somewhere in the stream of batches
        let the_completed = the_batches
            .iter()
            .flat_map(|batch| batch.checkpoints.iter())
            .filter(|entry| entry.is_completed())
            .count();
        assert_eq!(the_completed, 2);
    }

    #[tokio::test]
    async fn the_one_where_a_flaky_listing_is_survived() {
        let the_source = InMemorySource::new("bucket", 10);
        the_source.put("a.txt", "1\n2\n").await;
        the_source.fail_next_lists(2);
        let (tx, rx) = async_channel::bounded(16);

        SourceWorker::new(tx, the_iterator(&the_source), test_runtime(), Arc::default())
            .start()
            .await
            .expect("💀 worker panicked")
            .expect("💀 retryable errors should not end the worker");
        let the_records: usize = drain(rx).await.iter().map(|batch| batch.records.len()).sum();

        assert_eq!(the_records, 2);
        assert_eq!(the_source.list_calls(), 3);
    }

    #[tokio::test]
    async fn the_one_where_the_stop_flag_wins() {
        let the_source = InMemorySource::new("bucket", 10);
        the_source.put("a.txt", "1\n").await;
        let (tx, rx) = async_channel::bounded(16);
        let the_stop = Arc::new(AtomicBool::new(true));

        let the_stats = SourceWorker::new(tx, the_iterator(&the_source), test_runtime(), the_stop)
            .start()
            .await
            .expect("💀 worker panicked")
            .expect("💀 worker failed");

        assert!(drain(rx).await.is_empty());
        assert_eq!(the_stats, IteratorStats::default());
        assert_eq!(the_source.list_calls(), 0);
    }
}
