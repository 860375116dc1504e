// ai
//! 💾 File checkpoints — one JSON document on disk, replaced atomically on every commit.
//!
//! The document is an array of property maps. Reads parse the whole thing. Writes parse the
//! whole thing, merge, write a sibling `.tmp` file and rename it over the original, so a
//! reader never sees half a checkpoint file. Fine for thousands of objects. For millions,
//! use a real offset store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{CheckpointBackend, CheckpointEntry, PartitionIdentity, Properties};
use crate::error::{Result, SiphonError};

#[derive(Debug, Clone)]
pub struct FileCheckpointBackend {
    path: PathBuf,
    /// 🔒 Serializes writers sharing this handle. Readers don't need it, rename is atomic.
    write_lock: Arc<Mutex<()>>,
}

impl FileCheckpointBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 📖 Loads the whole document. A missing file is an empty store, not an error.
    async fn load(&self) -> Result<HashMap<PartitionIdentity, Properties>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                trace!("📭 no checkpoint file at '{}' yet", self.path.display());
                return Ok(HashMap::new());
            }
            Err(err) => return Err(err.into()),
        };
        let documents: Vec<Properties> = serde_json::from_slice(&bytes).map_err(|err| {
            SiphonError::Checkpoint(format!(
                "checkpoint file '{}' is not valid JSON: {err}",
                self.path.display()
            ))
        })?;
        documents
            .into_iter()
            .map(|properties| Ok((PartitionIdentity::from_properties(&properties)?, properties)))
            .collect()
    }
}

#[async_trait]
impl CheckpointBackend for FileCheckpointBackend {
    async fn read_many(
        &self,
        identities: &[PartitionIdentity],
    ) -> Result<HashMap<PartitionIdentity, Properties>> {
        let mut stored = self.load().await?;
        Ok(identities
            .iter()
            .filter_map(|identity| {
                stored
                    .remove(identity)
                    .map(|properties| (identity.clone(), properties))
            })
            .collect())
    }

    async fn read_one(&self, identity: &PartitionIdentity) -> Result<Option<Properties>> {
        Ok(self.load().await?.remove(identity))
    }

    async fn write_many(&self, entries: &[CheckpointEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load().await?;
        for entry in entries {
            let identity = entry.identity();
            let merged = match stored.remove(&identity) {
                Some(existing) => {
                    let mut current = CheckpointEntry::from_properties(existing)?;
                    current.merge_from(entry);
                    current.properties()
                }
                None => entry.properties(),
            };
            stored.insert(identity, merged);
        }

        let mut documents: Vec<_> = stored.into_iter().collect();
        documents.sort_by(|(left, _), (right, _)| left.cmp(right));
        let documents: Vec<Properties> = documents.into_iter().map(|(_, properties)| properties).collect();
        let payload = serde_json::to_vec_pretty(&documents).map_err(|err| {
            SiphonError::Checkpoint(format!("unable to serialize checkpoints: {err}"))
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_path, &payload).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        debug!(
            "💾 committed {} checkpoint(s) to '{}'",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Context;

    #[tokio::test]
    async fn the_one_where_checkpoints_outlive_the_handle() -> anyhow::Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("checkpoints.json");

        let mut the_entry = CheckpointEntry::new("bucket", &Context::for_key("a/b.txt"));
        the_entry.increment_record_count();
        the_entry.increment_record_count();
        FileCheckpointBackend::new(&the_path).write_many(&[the_entry.clone()]).await?;

        let the_reopened = FileCheckpointBackend::new(&the_path);
        let the_found = the_reopened.read_one(&the_entry.identity()).await?;
        assert_eq!(the_found, Some(the_entry.properties()));
        assert!(!the_dir.path().join("checkpoints.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_no_file_means_no_progress_yet() -> anyhow::Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_backend = FileCheckpointBackend::new(the_dir.path().join("missing.json"));
        let the_identity = CheckpointEntry::new("bucket", &Context::for_key("x")).identity();
        assert_eq!(the_backend.read_one(&the_identity).await?, None);
        assert!(the_backend.read_many(&[the_identity]).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_corrupt_file_is_called_out() -> anyhow::Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_path = the_dir.path().join("broken.json");
        tokio::fs::write(&the_path, b"{ this is not json").await?;
        let the_identity = CheckpointEntry::new("bucket", &Context::for_key("x")).identity();
        let the_result = FileCheckpointBackend::new(&the_path).read_one(&the_identity).await;
        assert!(matches!(the_result, Err(SiphonError::Checkpoint(_))));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_second_commit_merges_into_the_first() -> anyhow::Result<()> {
        let the_dir = tempfile::tempdir()?;
        let the_backend = FileCheckpointBackend::new(the_dir.path().join("c.json"));

        let mut the_first = CheckpointEntry::new("bucket", &Context::for_key("k"));
        the_first.set_property("note", "from the first run");
        let the_other = CheckpointEntry::new("bucket", &Context::for_key("other"));
        the_backend.write_many(&[the_first.clone(), the_other]).await?;

        let mut the_second = CheckpointEntry::new("bucket", &Context::for_key("k"));
        the_second.increment_record_count();
        the_second.mark_completed();
        the_backend.write_many(&[the_second]).await?;

        let the_found = the_backend
            .read_one(&the_first.identity())
            .await?
            .map(CheckpointEntry::from_properties)
            .transpose()?
            .expect("entry should exist");
        assert!(the_found.is_completed());
        assert_eq!(the_found.record_count(), 1);
        assert_eq!(
            the_found.get_property("note"),
            Some(&serde_json::Value::from("from the first run"))
        );
        Ok(())
    }
}
