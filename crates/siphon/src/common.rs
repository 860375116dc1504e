//! 📦 Common data structures — the luggage that travels the whole pipeline.
//!
//! 🎬 COLD OPEN — INT. OBJECT STORE — 3:47 AM
//!
//! Eleven thousand objects sit in a bucket. Each has a key. None has a clue which
//! worker will come for it. Somewhere a `NativeObject` is listed, matched, claimed,
//! fetched, decoded, and finally shipped as a `SourceRecord` wearing a snapshot of
//! its own checkpoint like a name tag at a conference nobody wanted to attend.
//!
//! 🧠 Knowledge graph:
//! - `NativeObject`: what the enumerator lists (key + size). Nothing fetched yet.
//! - `ObjectPage`: one page of listing + the cursor for the next page.
//! - `ByteStream`: type-erased async reader over an object's content.
//! - `RecordValue`: whatever the transform decoded (bytes, text, JSON).
//! - `SourceRecord`: the emitted unit. Immutable once handed out.
//! - `RecordBatch`: what the source worker ships to the sink worker.

use serde::Serialize;
use tokio::io::AsyncRead;

use crate::checkpoint::CheckpointEntry;
use crate::template::Context;

/// 🔗 Boxed async reader over object content. Same trick the S3 source used:
/// erase the concrete reader so struct fields and trait signatures stay sane.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// 🪣 An object as the enumerator sees it — a key and a size, no bytes yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeObject {
    pub key: String,
    pub size: u64,
}

impl NativeObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// 📄 One page of a listing. `next_cursor == None` means the listing is done.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<NativeObject>,
    pub next_cursor: Option<String>,
}

/// 🎁 A decoded value. The transform decides which flavour you get.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

impl RecordValue {
    /// 📏 Rough payload size, for progress reporting.
    pub fn len(&self) -> usize {
        match self {
            RecordValue::Bytes(bytes) => bytes.len(),
            RecordValue::Text(text) => text.len(),
            RecordValue::Json(value) => value.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 🎯 A single emitted record.
///
/// `checkpoint` is a snapshot taken the moment the record was produced: the
/// iterator keeps mutating its own copy of the entry, this one never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub object_key: String,
    pub object_size: u64,
    pub context: Context,
    pub checkpoint: CheckpointEntry,
    pub value: RecordValue,
}

impl SourceRecord {
    /// 🔢 The 1-based position of this record inside its object.
    pub fn record_count(&self) -> u64 {
        self.checkpoint.record_count()
    }

    pub fn topic(&self) -> Option<&str> {
        self.context.topic.as_deref()
    }

    pub fn partition(&self) -> Option<u32> {
        self.context.partition
    }
}

/// 📦 A poll's worth of records plus the checkpoint entries that became dirty
/// while producing them. The sink worker commits `checkpoints` only after the
/// records are safely written.
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<SourceRecord>,
    pub checkpoints: Vec<CheckpointEntry>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.checkpoints.is_empty()
    }

    /// 📊 Counts payload bytes across the batch. One iterator, one map, one sum.
    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(|record| record.value.len()).sum()
    }
}
