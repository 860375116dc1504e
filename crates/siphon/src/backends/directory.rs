// ai
//! 📂 Previously, on "Things That Could Go Wrong With A Directory"...
//!
//! Someone rsync'd a bucket to local disk and asked us to ingest it. Fine. A directory is just a
//! bucket with a worse API. Keys are `/`-separated paths relative to `root`, listed in sorted
//! order, a page at a time, with the last key of a page as the cursor for the next one.
//!
//! 🚰 `list_objects(None)` walks and sorts once, the pages after it slice that snapshot
//! 🙈 names that aren't UTF-8 can't be keys, so they're warned about and left out
//! 👻 file deleted between list and read → `Vanished`, the next pass won't list it
//! 🦆 (mandatory, no notes)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::File;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::backends::{ObjectSource, default_page_size};
use crate::common::{ByteStream, NativeObject, ObjectPage};
use crate::error::{Result, SiphonError};

// 📂 DirectorySourceConfig — co-located with the source that uses it.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySourceConfig {
    pub root: PathBuf,
    /// 🏷️ Defaults to the directory's own name.
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// 📸 The sorted listing of the current pass. Clones share it.
type Snapshot = Arc<Vec<NativeObject>>;

#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    bucket: String,
    page_size: usize,
    snapshot: Arc<Mutex<Option<Snapshot>>>,
}

impl DirectorySource {
    pub fn new(config: DirectorySourceConfig) -> Self {
        let bucket = config.bucket.unwrap_or_else(|| {
            config
                .root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "local".to_string())
        });
        Self {
            root: config.root,
            bucket,
            page_size: config.page_size.max(1),
            snapshot: Arc::default(),
        }
    }

    /// 🚶 Every non-empty file under `root` as `(key, size)`, sorted by key.
    async fn walk(&self) -> Result<Vec<NativeObject>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|err| remote_error(&dir, err))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| remote_error(&dir, err))?
            {
                let metadata = entry.metadata().await.map_err(|err| remote_error(&entry.path(), err))?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else if metadata.is_file() && metadata.len() > 0 {
                    match self.key_for(&entry.path()) {
                        Some(key) => objects.push(NativeObject::new(key, metadata.len())),
                        None => warn!(
                            "⚠️ '{}' has a name that isn't UTF-8 and can't be a key, skipping it",
                            entry.path().display()
                        ),
                    }
                }
            }
        }
        objects.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(objects)
    }

    /// 🔑 `None` when any path component isn't valid UTF-8: a lossy key would never open again.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|part| part.as_os_str().to_str())
            .collect::<Option<Vec<&str>>>()?;
        Some(parts.join("/"))
    }

    /// 📸 A fresh walk when a pass starts, the cached one for every page after.
    async fn snapshot_for(&self, cursor: Option<&str>) -> Result<Snapshot> {
        let mut cached = self.snapshot.lock().await;
        if let (Some(_), Some(snapshot)) = (cursor, cached.as_ref()) {
            return Ok(snapshot.clone());
        }
        let fresh: Snapshot = Arc::new(self.walk().await?);
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

fn remote_error(path: &Path, err: std::io::Error) -> SiphonError {
    SiphonError::retryable(format!("unable to read '{}': {err}", path.display()))
}

fn open_error(key: &str, path: &Path, err: std::io::Error) -> SiphonError {
    if err.kind() == std::io::ErrorKind::NotFound {
        SiphonError::Vanished { key: key.to_string() }
    } else {
        remote_error(path, err)
    }
}

#[async_trait]
impl ObjectSource for DirectorySource {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage> {
        let snapshot = self.snapshot_for(cursor).await?;
        let start = match cursor {
            Some(after) => snapshot.partition_point(|object| object.key.as_str() <= after),
            None => 0,
        };
        let end = start.saturating_add(self.page_size).min(snapshot.len());
        let page = snapshot[start..end].to_vec();
        let next_cursor = if end < snapshot.len() {
            page.last().map(|object| object.key.clone())
        } else {
            None
        };
        debug!(
            "📄 listed {} object(s) under '{}' after {:?}",
            page.len(),
            self.root.display(),
            cursor
        );
        Ok(ObjectPage {
            objects: page,
            next_cursor,
        })
    }

    async fn open_stream(&self, key: &str) -> Result<ByteStream> {
        let path = self.root.join(key);
        trace!("📖 opening '{}'", path.display());
        let file = File::open(&path).await.map_err(|err| open_error(key, &path, err))?;
        Ok(Box::new(file))
    }
}
