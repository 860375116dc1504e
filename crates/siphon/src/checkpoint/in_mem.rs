//! 🧠 In-memory checkpoints. Gone when the process goes. Perfect for tests, useless for prod.
//!
//! Counts every call, because the interesting tests are about how OFTEN we ask, not what we get.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CheckpointBackend, CheckpointEntry, PartitionIdentity, Properties};
use crate::error::Result;

#[derive(Debug, Default)]
struct CallCounters {
    read_many: AtomicUsize,
    read_one: AtomicUsize,
    write_many: AtomicUsize,
}

/// 🔒 Shared map behind an `Arc<Mutex<...>>`. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointBackend {
    entries: Arc<Mutex<HashMap<PartitionIdentity, Properties>>>,
    calls: Arc<CallCounters>,
}

impl InMemoryCheckpointBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🌱 Seeds the backend, as if a previous run had committed these.
    pub fn with_entries(entries: impl IntoIterator<Item = CheckpointEntry>) -> Self {
        let seeded = entries
            .into_iter()
            .map(|entry| (entry.identity(), entry.properties()))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(seeded)),
            calls: Arc::default(),
        }
    }

    /// 📸 Everything stored, sorted by identity.
    pub async fn snapshot(&self) -> Vec<CheckpointEntry> {
        let entries = self.entries.lock().await;
        let mut snapshot: Vec<_> = entries
            .values()
            .filter_map(|properties| CheckpointEntry::from_properties(properties.clone()).ok())
            .collect();
        snapshot.sort_by_key(CheckpointEntry::identity);
        snapshot
    }

    pub fn read_many_calls(&self) -> usize {
        self.calls.read_many.load(Ordering::Relaxed)
    }

    pub fn read_one_calls(&self) -> usize {
        self.calls.read_one.load(Ordering::Relaxed)
    }

    pub fn write_many_calls(&self) -> usize {
        self.calls.write_many.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CheckpointBackend for InMemoryCheckpointBackend {
    async fn read_many(
        &self,
        identities: &[PartitionIdentity],
    ) -> Result<HashMap<PartitionIdentity, Properties>> {
        self.calls.read_many.fetch_add(1, Ordering::Relaxed);
        let entries = self.entries.lock().await;
        Ok(identities
            .iter()
            .filter_map(|identity| {
                entries
                    .get(identity)
                    .map(|properties| (identity.clone(), properties.clone()))
            })
            .collect())
    }

    async fn read_one(&self, identity: &PartitionIdentity) -> Result<Option<Properties>> {
        self.calls.read_one.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.lock().await.get(identity).cloned())
    }

    async fn write_many(&self, entries: &[CheckpointEntry]) -> Result<()> {
        self.calls.write_many.fetch_add(1, Ordering::Relaxed);
        let mut stored = self.entries.lock().await;
        for entry in entries {
            let identity = entry.identity();
            let merged = match stored.get(&identity) {
                Some(existing) => {
                    let mut current = CheckpointEntry::from_properties(existing.clone())?;
                    current.merge_from(entry);
                    current.properties()
                }
                None => entry.properties(),
            };
            stored.insert(identity, merged);
        }
        Ok(())
    }
}
