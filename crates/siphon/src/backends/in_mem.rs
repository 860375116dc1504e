//! # Previously, on siphon...
//!
//! 🎬 The bucket was a lie. It was a `BTreeMap` all along. Keys in, bytes out, no network,
//! no credentials, no 503 at 2am unless a test asks for one.
//!
//! [`InMemorySource`] is the object source the tests drive. It counts list and fetch calls so
//! a test can prove the iterator never downloaded something it didn't own, and it can be told
//! to fail the next N listings or fetches with a retryable error.
//!
//! ⚠️ This is NOT for production. This is for tests and demos. 🦆

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::{ObjectSource, default_page_size};
use crate::common::{ByteStream, NativeObject, ObjectPage};
use crate::error::{Result, SiphonError};

#[derive(Debug, Clone, Deserialize)]
pub struct InMemorySourceConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// 📦 Key → UTF-8 content. Handy for demos, everything else should use a directory.
    #[serde(default)]
    pub objects: BTreeMap<String, String>,
}

fn default_bucket() -> String {
    "memory".to_string()
}

#[derive(Debug, Default)]
struct Counters {
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    failing_lists: AtomicUsize,
    failing_fetches: AtomicUsize,
}

/// 🗄️ A bucket in RAM. Clones share objects and counters.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    bucket: String,
    page_size: usize,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    counters: Arc<Counters>,
}

impl InMemorySource {
    pub fn new(bucket: impl Into<String>, page_size: usize) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: page_size.max(1),
            objects: Arc::default(),
            counters: Arc::default(),
        }
    }

    pub fn from_config(config: &InMemorySourceConfig) -> Self {
        let objects = config
            .objects
            .iter()
            .map(|(key, content)| (key.clone(), content.as_bytes().to_vec()))
            .collect();
        Self {
            objects: Arc::new(Mutex::new(objects)),
            ..Self::new(config.bucket.clone(), config.page_size)
        }
    }

    pub async fn put(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.objects.lock().await.insert(key.into(), content.into());
    }

    /// 🗑️ Deletes an object, as if someone else cleaned up the bucket behind our back.
    pub async fn remove(&self, key: &str) {
        self.objects.lock().await.remove(key);
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_calls(&self) -> usize {
        self.counters.fetch_calls.load(Ordering::Relaxed)
    }

    /// 💥 The next `count` listings fail with a retryable error.
    pub fn fail_next_lists(&self, count: usize) {
        self.counters.failing_lists.store(count, Ordering::Relaxed);
    }

    /// 💥 The next `count` fetches fail with a retryable error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.counters.failing_fetches.store(count, Ordering::Relaxed);
    }
}

/// 🎲 Decrements a pending-failure counter. `true` means "fail this call".
fn take_failure(pending: &AtomicUsize) -> bool {
    pending
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ObjectSource for InMemorySource {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage> {
        self.counters.list_calls.fetch_add(1, Ordering::Relaxed);
        if take_failure(&self.counters.failing_lists) {
            return Err(SiphonError::retryable("in-memory listing failed on request"));
        }

        let objects = self.objects.lock().await;
        let mut remaining = objects
            .iter()
            .filter(|(key, content)| !content.is_empty() && cursor.is_none_or(|after| key.as_str() > after));
        let page: Vec<NativeObject> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(key, content)| NativeObject::new(key.clone(), content.len() as u64))
            .collect();
        let next_cursor = match remaining.next() {
            Some(_) => page.last().map(|object| object.key.clone()),
            None => None,
        };
        trace!("📄 listed {} in-memory object(s), more: {}", page.len(), next_cursor.is_some());
        Ok(ObjectPage {
            objects: page,
            next_cursor,
        })
    }

    async fn open_stream(&self, key: &str) -> Result<ByteStream> {
        self.counters.fetch_calls.fetch_add(1, Ordering::Relaxed);
        if take_failure(&self.counters.failing_fetches) {
            return Err(SiphonError::retryable(format!("in-memory fetch of '{key}' failed on request")));
        }
        let content = self
            .objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SiphonError::Vanished { key: key.to_string() })?;
        Ok(Box::new(Cursor::new(content)))
    }
}
