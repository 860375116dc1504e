// ai
//! 📂 FileSink — one NDJSON line per record, flushed before every checkpoint commit.
//!
//! Each line carries where the record came from (`key`, `topic`, `partition`), which record
//! of the object it was (`record_count`) and the decoded `value`. Enough to dedupe downstream
//! if a crash ever makes us send something twice.
//!
//! ⚠️ `File::create` truncates if the file exists. No warning. No backup. Set `append = true`
//! when a restart should keep what the last run wrote.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::trace;

use super::Sink;
use crate::common::{RecordValue, SourceRecord};

// 📂 FileSinkConfig — lives next to the FileSink that uses it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    pub file_name: String,
    #[serde(default)]
    pub append: bool,
}

#[derive(Serialize)]
struct SinkLine<'a> {
    key: &'a str,
    topic: Option<&'a str>,
    partition: Option<u32>,
    record_count: u64,
    value: &'a RecordValue,
}

/// 🚰 BufWriter around a tokio `File`. Writes what you give it, flushes when asked, and
/// always flushes before saying "done".
#[derive(Debug)]
pub struct FileSink {
    file_buf: BufWriter<File>,
    config: FileSinkConfig,
}

impl FileSink {
    pub async fn new(config: FileSinkConfig) -> Result<Self> {
        let file_handle = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file_name)
                .await
        } else {
            File::create(&config.file_name).await
        }
        .with_context(|| {
            format!(
                "💀 The sink file '{}' could not be conjured into existence. \
                 We stared at the path. The path stared back. \
                 One of us was wrong about whether the parent directory existed.",
                config.file_name
            )
        })?;
        Ok(Self {
            file_buf: BufWriter::new(file_handle),
            config,
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn receive(&mut self, records: Vec<SourceRecord>) -> Result<()> {
        trace!("📬 {} record(s) walked into the sink. writing them all down.", records.len());
        for record in &records {
            let line = SinkLine {
                key: &record.object_key,
                topic: record.topic(),
                partition: record.partition(),
                record_count: record.record_count(),
                value: &record.value,
            };
            let mut encoded = serde_json::to_vec(&line).context("💀 a record refused to become JSON")?;
            encoded.push(b'\n');
            self.file_buf.write_all(&encoded).await?;
        }
        // ✅ durable before the checkpoint commit, not after
        self.file_buf
            .flush()
            .await
            .with_context(|| format!("💀 flushing '{}' failed with records still in the buffer", self.config.file_name))
    }

    async fn close(&mut self) -> Result<()> {
        trace!("🎬 final flush of '{}'", self.config.file_name);
        self.file_buf.flush().await.context(
            "💀 Error flushing file. The bytes are still in memory. The disk remains unwritten.",
        )
    }
}
