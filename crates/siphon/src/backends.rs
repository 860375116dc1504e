//! 🔌 Backends — where objects come from.
//!
//! 🚰 An object source lists keys a page at a time and opens a byte stream for one key
//! when (and only when) the iterator has decided the object is worth the bandwidth.
//!
//! 🎭 This module is the casting agency. A directory on local disk pretending to be a bucket?
//! A `BTreeMap` pretending to be a directory pretending to be a bucket? We've got both.
//!
//! 🧠 Knowledge graph:
//! - [`ObjectSource`]: the narrow trait the iterator talks to.
//! - [`SourceBackend`]: enum dispatch over the concrete sources.
//! - [`SourceConfig`]: `[source_config.Directory]` or `[source_config.InMemory]`, co-located
//!   configs live next to their sources.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use async_trait::async_trait;
use serde::Deserialize;

use crate::common::{ByteStream, ObjectPage};
use crate::error::Result;

pub(crate) mod directory;
pub(crate) mod in_mem;

pub use directory::{DirectorySource, DirectorySourceConfig};
pub use in_mem::{InMemorySource, InMemorySourceConfig};

/// 🪣 A bucket-shaped thing the iterator can list and read.
///
/// # Contract
/// - `list_objects(None)` starts a listing; `list_objects(Some(cursor))` continues it with the
///   cursor the previous page handed back. `next_cursor == None` ends the listing.
/// - Keys come back in a stable order. Zero-size objects may be left out.
/// - `open_stream` is only called for objects the iterator means to read. It fails with
///   `SiphonError::Vanished` if the object is gone, and with a remote error for anything else.
#[async_trait]
pub trait ObjectSource: std::fmt::Debug + Send + Sync {
    /// 🏷️ Bucket name, part of every checkpoint identity.
    fn bucket(&self) -> &str;

    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage>;

    async fn open_stream(&self, key: &str) -> Result<ByteStream>;
}

/// 🎭 The many faces of an object source.
#[derive(Debug, Clone)]
pub enum SourceBackend {
    InMemory(InMemorySource),
    Directory(DirectorySource),
}

#[async_trait]
impl ObjectSource for SourceBackend {
    fn bucket(&self) -> &str {
        match self {
            SourceBackend::InMemory(source) => source.bucket(),
            SourceBackend::Directory(source) => source.bucket(),
        }
    }

    async fn list_objects(&self, cursor: Option<&str>) -> Result<ObjectPage> {
        match self {
            SourceBackend::InMemory(source) => source.list_objects(cursor).await,
            SourceBackend::Directory(source) => source.list_objects(cursor).await,
        }
    }

    async fn open_stream(&self, key: &str) -> Result<ByteStream> {
        match self {
            SourceBackend::InMemory(source) => source.open_stream(key).await,
            SourceBackend::Directory(source) => source.open_stream(key).await,
        }
    }
}

/// 🔧 Which object source to read from.
#[derive(Debug, Clone, Deserialize)]
pub enum SourceConfig {
    Directory(DirectorySourceConfig),
    InMemory(InMemorySourceConfig),
}

impl SourceConfig {
    pub fn build(&self) -> SourceBackend {
        match self {
            SourceConfig::Directory(config) => SourceBackend::Directory(DirectorySource::new(config.clone())),
            SourceConfig::InMemory(config) => SourceBackend::InMemory(InMemorySource::from_config(config)),
        }
    }
}

/// 📄 Shared page size default: a thousand keys, same as the object stores hand out.
pub(crate) fn default_page_size() -> usize {
    1000
}
