//! 🕳️ Sinks — where records go once a worker has claimed them.
//!
//! 🎭 The downstream system is somebody else's problem, mostly. These sinks exist so the
//! poll loop has somewhere honest to put records and so the checkpoint commit has something
//! to wait on: a batch's checkpoints are committed only after `receive` returns `Ok`.
//!
//! 🧠 Knowledge graph:
//! - [`Sink`]: `receive` a batch of records, `close` when the channel is done.
//! - [`SinkBackend`]: enum dispatch, the same shape as the object sources.
//! - [`SinkConfig`]: `[sink_config.File]` or `[sink_config.InMemory]`.
//!
//! ⚠️ `receive` must not return `Ok` until the records are durable. Everything downstream of
//! the checkpoint commit assumes it. 🦆

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::common::SourceRecord;

pub(crate) mod file;
pub(crate) mod in_mem;

pub use file::{FileSink, FileSinkConfig};
pub use in_mem::InMemorySink;

/// 🕳️ A sink that consumes records.
///
/// # Contract
/// - `receive` returns `Ok` only once the records are written for good.
/// - `close` flushes and releases. MUST be called. Skipping it is a bug, and also rude.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    async fn receive(&mut self, records: Vec<SourceRecord>) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a sink.
#[derive(Debug)]
pub enum SinkBackend {
    InMemory(InMemorySink),
    File(FileSink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn receive(&mut self, records: Vec<SourceRecord>) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.receive(records).await,
            SinkBackend::File(sink) => sink.receive(records).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::File(sink) => sink.close().await,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub enum SinkConfig {
    File(FileSinkConfig),
    InMemory {},
}

impl SinkConfig {
    pub async fn build(&self) -> Result<SinkBackend> {
        Ok(match self {
            SinkConfig::File(config) => SinkBackend::File(FileSink::new(config.clone()).await?),
            SinkConfig::InMemory {} => SinkBackend::InMemory(InMemorySink::new()),
        })
    }
}
