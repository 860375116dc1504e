//! 🗂️ CheckpointStore — the iterator's private notebook in front of a backend.
//!
//! 🧠 Knowledge graph:
//! - `table` maps identity → `Some(entry)` (known) or `None` (known absent). An identity not in
//!   the table at all is unknown and costs one `read_one` to learn about.
//! - `preload` asks the backend about a whole page of identities in one round trip and
//!   remembers hits AND misses, so the page never triggers per-object reads afterwards.
//! - `merge` union-merges into the table and marks the identity dirty.
//! - `take_dirty` hands the dirty entries to whoever commits them downstream.
//!
//! Owned by exactly one iterator. `&mut self` everywhere, no locks.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use super::{CheckpointBackend, CheckpointBackendKind, CheckpointEntry, PartitionIdentity, Properties};
use crate::error::Result;

#[derive(Debug)]
pub struct CheckpointStore {
    backend: CheckpointBackendKind,
    table: HashMap<PartitionIdentity, Option<CheckpointEntry>>,
    dirty: BTreeSet<PartitionIdentity>,
}

impl CheckpointStore {
    pub fn new(backend: CheckpointBackendKind) -> Self {
        Self {
            backend,
            table: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn backend(&self) -> &CheckpointBackendKind {
        &self.backend
    }

    /// 📚 One bulk read for every identity we haven't heard of yet.
    pub async fn preload(&mut self, identities: &[PartitionIdentity]) -> Result<()> {
        let unknown: Vec<PartitionIdentity> = identities
            .iter()
            .filter(|identity| !self.table.contains_key(*identity))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }

        let mut found = self.backend.read_many(&unknown).await?;
        trace!("📚 preloaded {} of {} checkpoint(s)", found.len(), unknown.len());
        for identity in unknown {
            let entry = found
                .remove(&identity)
                .map(CheckpointEntry::from_properties)
                .transpose()?;
            self.table.insert(identity, entry);
        }
        Ok(())
    }

    /// 🔍 The entry for `identity`, built by `factory` from its properties.
    ///
    /// Known → factory. Known absent → `None`. Unknown → exactly one `read_one`, cached either way.
    /// Never invents an entry that the backend did not have.
    pub async fn get_or_create<F>(
        &mut self,
        identity: &PartitionIdentity,
        factory: F,
    ) -> Result<Option<CheckpointEntry>>
    where
        F: FnOnce(Properties) -> Result<CheckpointEntry>,
    {
        if !self.table.contains_key(identity) {
            let loaded = self
                .backend
                .read_one(identity)
                .await?
                .map(CheckpointEntry::from_properties)
                .transpose()?;
            self.table.insert(identity.clone(), loaded);
        }
        match self.table.get(identity) {
            Some(Some(entry)) => factory(entry.properties()).map(Some),
            _ => Ok(None),
        }
    }

    /// 🤝 Union-merges `entry` into the table and marks it dirty.
    pub fn merge(&mut self, entry: &CheckpointEntry) {
        let identity = entry.identity();
        match self.table.get_mut(&identity) {
            Some(Some(existing)) => existing.merge_from(entry),
            _ => {
                self.table.insert(identity.clone(), Some(entry.clone()));
            }
        }
        self.dirty.insert(identity);
    }

    /// 👀 What the table currently holds for `identity`, without touching the backend.
    pub fn cached(&self, identity: &PartitionIdentity) -> Option<&CheckpointEntry> {
        self.table.get(identity).and_then(Option::as_ref)
    }

    /// 🧺 Drains the entries merged since the last call, in identity order.
    pub fn take_dirty(&mut self) -> Vec<CheckpointEntry> {
        std::mem::take(&mut self.dirty)
            .into_iter()
            .filter_map(|identity| self.cached(&identity).cloned())
            .collect()
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }
}
