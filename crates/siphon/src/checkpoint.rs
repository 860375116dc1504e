//! 📒 Checkpoints — remembering how far we got, so a restart is a resume and not a rerun.
//!
//! 🎬 COLD OPEN — INT. WORKER POD — SECONDS AFTER A RESTART
//!
//! The pod comes back. It has no memory. It lists the bucket and sees the same object it was
//! halfway through when the OOM killer came calling. Without a checkpoint it would send the
//! first 40,000 records again. With one, it skips them, and nobody downstream ever finds out.
//!
//! 🧠 Knowledge graph:
//! - [`CheckpointEntry`] / [`PartitionIdentity`]: the data (see `entry.rs`).
//! - [`CheckpointBackend`]: where entries are persisted. Bulk read, single read, bulk write.
//! - [`CheckpointBackendKind`]: enum dispatch over the in-memory and file backends, same shape
//!   as the source and sink backends.
//! - [`CheckpointStore`]: the iterator's private cache in front of a backend, with preload,
//!   get-or-create, merge and a dirty set.
//!
//! ⚠️ Backends are cheap handles (`Clone`). The store reads through one copy, the sink worker
//! commits through another. 🦆

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub(crate) mod entry;
pub(crate) mod file;
pub(crate) mod in_mem;
pub(crate) mod store;

pub use entry::{CheckpointEntry, PartitionIdentity, Properties};
pub use file::FileCheckpointBackend;
pub use in_mem::InMemoryCheckpointBackend;
pub use store::CheckpointStore;

/// 🗄️ Persistence for checkpoint entries.
///
/// # Contract
/// - `read_many` returns only the identities it knows. Unknown ones are simply absent.
/// - `read_one` is `Ok(None)` for an unknown identity, never an error.
/// - `write_many` union-merges each entry into whatever is already stored.
#[async_trait]
pub trait CheckpointBackend: std::fmt::Debug + Send + Sync {
    async fn read_many(
        &self,
        identities: &[PartitionIdentity],
    ) -> Result<HashMap<PartitionIdentity, Properties>>;

    async fn read_one(&self, identity: &PartitionIdentity) -> Result<Option<Properties>>;

    async fn write_many(&self, entries: &[CheckpointEntry]) -> Result<()>;
}

/// 🎭 Every checkpoint backend siphon knows how to talk to.
#[derive(Debug, Clone)]
pub enum CheckpointBackendKind {
    InMemory(InMemoryCheckpointBackend),
    File(FileCheckpointBackend),
}

#[async_trait]
impl CheckpointBackend for CheckpointBackendKind {
    async fn read_many(
        &self,
        identities: &[PartitionIdentity],
    ) -> Result<HashMap<PartitionIdentity, Properties>> {
        match self {
            CheckpointBackendKind::InMemory(backend) => backend.read_many(identities).await,
            CheckpointBackendKind::File(backend) => backend.read_many(identities).await,
        }
    }

    async fn read_one(&self, identity: &PartitionIdentity) -> Result<Option<Properties>> {
        match self {
            CheckpointBackendKind::InMemory(backend) => backend.read_one(identity).await,
            CheckpointBackendKind::File(backend) => backend.read_one(identity).await,
        }
    }

    async fn write_many(&self, entries: &[CheckpointEntry]) -> Result<()> {
        match self {
            CheckpointBackendKind::InMemory(backend) => backend.write_many(entries).await,
            CheckpointBackendKind::File(backend) => backend.write_many(entries).await,
        }
    }
}

/// 🔧 `[checkpoint_config.File]` or `[checkpoint_config.InMemory]`.
#[derive(Debug, Clone, Deserialize)]
pub enum CheckpointConfig {
    InMemory {},
    File { path: PathBuf },
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig::InMemory {}
    }
}

impl CheckpointConfig {
    pub fn build(&self) -> CheckpointBackendKind {
        match self {
            CheckpointConfig::InMemory {} => {
                CheckpointBackendKind::InMemory(InMemoryCheckpointBackend::new())
            }
            CheckpointConfig::File { path } => {
                CheckpointBackendKind::File(FileCheckpointBackend::new(path.clone()))
            }
        }
    }
}
