//! 🔁 SourceRecordIterator — the orchestrator. List, match, claim, checkpoint, fetch, decode, emit.
//!
//! 🎬 COLD OPEN — INT. WORKER 3 OF 10 — THE POLL LOOP ASKS "ANYTHING?"
//!
//! The iterator doesn't know yet. It has a listing cursor, a queue of objects it already
//! claimed, maybe half an object open, maybe one record peeked and waiting. It does the least
//! amount of work that produces one record, then stops and hands it over. Nothing is
//! downloaded until it is this worker's to download. Nothing is listed until the queue is dry.
//!
//! ```text
//!   Idle ──has_next──▶ Enumerating ──page──▶ candidates ──fetch──▶ Streaming ──record──▶ peeked
//!                          ▲                                          │
//!                          └────────────── stream ended ◀─────────────┘
//!   cursor Finished + no candidates + nothing active ──▶ Exhausted (until rearm)
//! ```
//!
//! 🧠 Knowledge graph:
//! - Pull contract: `has_next()` buffers at most one record, `next()` hands it out and merges
//!   its checkpoint snapshot into the store.
//! - Copy-on-emit: each record carries a clone of the object's entry as it was at emit time.
//! - Completion: when an object's stream ends, its entry is marked `completed` and merged.
//! - Errors propagate unchanged. A failed fetch or a retryable mid-stream failure puts the
//!   object back at the front of the queue (resuming after the records already handed out),
//!   so calling `has_next()` again simply retries it. `rearm()` is never required for that.
//! - An object that vanished between listing and fetch is skipped, not retried.
//!
//! ⚠️ One iterator per worker. It owns its store. No locks, no threads, just `&mut self`. 🦆

use std::collections::VecDeque;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::backends::{ObjectSource, SourceBackend};
use crate::checkpoint::{CheckpointEntry, CheckpointStore, PartitionIdentity};
use crate::common::{NativeObject, SourceRecord};
use crate::distribution::{Distribution, Subject, TaskAssignment};
use crate::error::{Result, SiphonError};
use crate::template::Context;
use crate::transforms::{RecordStream, Transformer};

/// 🚦 Where the iterator is in its pull cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Enumerating,
    Streaming,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ListingCursor {
    Start,
    Continue(String),
    Finished,
}

/// 📊 What the iterator has been up to since it was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IteratorStats {
    pub pages_listed: u64,
    pub objects_seen: u64,
    pub unmatched: u64,
    pub unowned: u64,
    pub completed_skipped: u64,
    pub objects_fetched: u64,
    pub vanished: u64,
    pub objects_completed: u64,
    pub records_emitted: u64,
}

/// 🎟️ Matched, owned, checkpoint resolved. Not fetched yet.
#[derive(Debug)]
struct Candidate {
    object: NativeObject,
    context: Context,
    checkpoint: CheckpointEntry,
}

/// 📖 The object currently being read.
struct ActiveObject {
    object: NativeObject,
    context: Context,
    checkpoint: CheckpointEntry,
    records: RecordStream,
}

// 🐛 the record stream is a boxed trait object with nothing useful to print
impl std::fmt::Debug for ActiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveObject")
            .field("object", &self.object)
            .field("record_count", &self.checkpoint.record_count())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct SourceRecordIterator {
    source: SourceBackend,
    distribution: Distribution,
    transformer: Transformer,
    store: CheckpointStore,
    phase: Phase,
    cursor: ListingCursor,
    candidates: VecDeque<Candidate>,
    active: Option<ActiveObject>,
    peeked: Option<SourceRecord>,
    stats: IteratorStats,
}

impl SourceRecordIterator {
    pub fn new(
        source: SourceBackend,
        distribution: Distribution,
        transformer: Transformer,
        store: CheckpointStore,
    ) -> Self {
        Self {
            source,
            distribution,
            transformer,
            store,
            phase: Phase::Idle,
            cursor: ListingCursor::Start,
            candidates: VecDeque::new(),
            active: None,
            peeked: None,
            stats: IteratorStats::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> &IteratorStats {
        &self.stats
    }

    /// 🧺 Checkpoint entries merged since the last call, ready to commit downstream.
    pub fn take_dirty(&mut self) -> Vec<CheckpointEntry> {
        self.store.take_dirty()
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// ❓ Advances until one record is buffered (`true`) or the listing is exhausted (`false`).
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        loop {
            if let Some(active) = self.active.as_mut() {
                match active.records.next().await {
                    Some(Ok(value)) => {
                        active.checkpoint.increment_record_count();
                        let record = SourceRecord {
                            object_key: active.object.key.clone(),
                            object_size: active.object.size,
                            context: active.context.clone(),
                            checkpoint: active.checkpoint.clone(),
                            value,
                        };
                        trace!(
                            "🎯 record {} of '{}' buffered",
                            record.record_count(),
                            record.object_key
                        );
                        self.stats.records_emitted += 1;
                        self.peeked = Some(record);
                        self.phase = Phase::Streaming;
                        return Ok(true);
                    }
                    Some(Err(err)) => {
                        if let Some(failed) = self.active.take() {
                            if err.is_retryable() {
                                debug!(
                                    "🔁 '{}' failed mid-stream, re-queued after {} record(s)",
                                    failed.object.key,
                                    failed.checkpoint.record_count()
                                );
                                self.candidates.push_front(Candidate {
                                    object: failed.object,
                                    context: failed.context,
                                    checkpoint: failed.checkpoint,
                                });
                            } else {
                                debug!("💀 dropping '{}' after a decode failure", failed.object.key);
                            }
                        }
                        return Err(err);
                    }
                    None => {
                        if let Some(mut finished) = self.active.take() {
                            finished.checkpoint.mark_completed();
                            self.store.merge(&finished.checkpoint);
                            self.stats.objects_completed += 1;
                            debug!(
                                "✅ '{}' completed after {} record(s)",
                                finished.object.key,
                                finished.checkpoint.record_count()
                            );
                        }
                        continue;
                    }
                }
            }

            if let Some(candidate) = self.candidates.pop_front() {
                self.open(candidate).await?;
                continue;
            }

            if self.cursor == ListingCursor::Finished {
                self.phase = Phase::Exhausted;
                return Ok(false);
            }

            self.phase = Phase::Enumerating;
            self.list_next_page().await?;
        }
    }

    /// ⏭️ The buffered record, with its checkpoint merged into the store. `None` when exhausted.
    pub async fn next(&mut self) -> Result<Option<SourceRecord>> {
        if !self.has_next().await? {
            return Ok(None);
        }
        let record = self.peeked.take();
        if let Some(record) = &record {
            self.store.merge(&record.checkpoint);
        }
        Ok(record)
    }

    /// 🔄 Forgets the listing and anything in flight. The next `has_next` lists from the top;
    /// checkpoints make sure nothing already handed out comes back. Used to start a new pass,
    /// and after a backoff, so a listing failure doesn't leave a half-read page behind.
    pub fn rearm(&mut self) {
        trace!("🔄 re-arming the iterator");
        self.cursor = ListingCursor::Start;
        self.candidates.clear();
        self.active = None;
        self.peeked = None;
        self.phase = Phase::Idle;
    }

    /// 📥 Fetches content NOW. Only ever called for matched, owned, unfinished objects.
    ///
    /// On failure the candidate goes back to the front of the queue before the error is returned.
    async fn open(&mut self, candidate: Candidate) -> Result<()> {
        debug!(
            "📥 fetching '{}' ({} bytes), resuming after {} record(s)",
            candidate.object.key,
            candidate.object.size,
            candidate.checkpoint.record_count()
        );
        let stream = match self.source.open_stream(&candidate.object.key).await {
            Ok(stream) => stream,
            Err(SiphonError::Vanished { key }) => {
                warn!("👻 '{key}' vanished after it was listed, skipping it");
                self.stats.vanished += 1;
                return Ok(());
            }
            Err(err) => {
                self.candidates.push_front(candidate);
                return Err(err);
            }
        };
        let Candidate {
            object,
            context,
            checkpoint,
        } = candidate;
        self.stats.objects_fetched += 1;
        let records = self
            .transformer
            .decode(stream, &context, checkpoint.record_count());
        self.active = Some(ActiveObject {
            object,
            context,
            checkpoint,
            records,
        });
        self.phase = Phase::Streaming;
        Ok(())
    }

    /// 📄 Lists one page and queues the objects this task owns and hasn't finished.
    async fn list_next_page(&mut self) -> Result<()> {
        let cursor = match &self.cursor {
            ListingCursor::Start => None,
            ListingCursor::Continue(cursor) => Some(cursor.clone()),
            ListingCursor::Finished => return Ok(()),
        };
        let page = self.source.list_objects(cursor.as_deref()).await?;
        self.stats.pages_listed += 1;
        let bucket = self.source.bucket().to_string();

        let mut owned = Vec::new();
        for object in page.objects {
            self.stats.objects_seen += 1;
            let Some(context) = self.distribution.extractor.extract(&object.key)? else {
                debug!("🙅 '{}' does not match the template, skipping", object.key);
                self.stats.unmatched += 1;
                continue;
            };
            let mine = self
                .distribution
                .strategy
                .is_part_of_task(self.distribution.task, Subject::Context(&context))?;
            if !mine {
                trace!(
                    "🙅 '{}' belongs to another task than {}",
                    object.key,
                    self.distribution.task.task_id()
                );
                self.stats.unowned += 1;
                continue;
            }
            owned.push((object, context));
        }

        let identities: Vec<PartitionIdentity> = owned
            .iter()
            .map(|(_, context)| PartitionIdentity::for_object(&bucket, context))
            .collect();
        self.store.preload(&identities).await?;

        for ((object, context), identity) in owned.into_iter().zip(identities) {
            let checkpoint = match self
                .store
                .get_or_create(&identity, CheckpointEntry::from_properties)
                .await?
            {
                Some(entry) => entry,
                None => CheckpointEntry::new(&bucket, &context),
            };
            if checkpoint.is_completed() {
                trace!("⏩ '{}' already completed, not fetching", object.key);
                self.stats.completed_skipped += 1;
                continue;
            }
            self.candidates.push_back(Candidate {
                object,
                context,
                checkpoint,
            });
        }

        self.cursor = match page.next_cursor {
            Some(next) => ListingCursor::Continue(next),
            None => ListingCursor::Finished,
        };
        Ok(())
    }
}
