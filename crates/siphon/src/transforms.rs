// ai
//! 🔄 Transforms — bytes in, records out 🎭🚀
//!
//! 🎬 COLD OPEN — INT. DECODER RING FACTORY — 2:47 AM
//!
//! The object arrives as an opaque byte stream. Maybe gzipped. Maybe JSON lines. Maybe a
//! CSV someone swore was "basically JSON". The iterator doesn't care. It hands the stream,
//! the object's context and "you've already sent N of these" to a [`Transformer`] and gets
//! back a lazy, finite stream of [`RecordValue`]s.
//!
//! ## Architecture 📐
//!
//! ```text
//!  ByteStream ──▶ [gunzip?] ──▶ RecordDecoder ──▶ skip N ──▶ RecordStream
//!                  Compression    BytesChunks
//!                                 TextLines
//!                                 JsonLines
//! ```
//!
//! Every decoder is a zero-sized marker type with a static `decode`. The compiler
//! monomorphizes each one, the [`Transformer`] picks one with a `match`.
//!
//! ## Knowledge Graph 🧠
//! - Used by: `iterator` (one `decode` per fetched object)
//! - Laziness: nothing is read until the stream is polled, gzip included. Gzip is inflated
//!   slice by slice ([`gzip::GunzipReader`]), never the whole object at once.
//! - Skipping: the first `skip_records` successful records are dropped, errors never are.
//! - Errors: undecodable content → `SiphonError::Transform`; I/O hiccups mid-read →
//!   retryable `SiphonError::Remote`. 🦆

use std::future::ready;

use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use tracing::trace;

use crate::common::{ByteStream, RecordValue};
use crate::error::{Result, SiphonError};
use crate::template::Context;

pub(crate) mod bytes;
pub(crate) mod gzip;
pub(crate) mod json_lines;
pub(crate) mod lines;

pub use bytes::BytesChunks;
pub use json_lines::JsonLines;
pub use lines::TextLines;

/// 🌊 A lazy, finite, owned stream of decoded values.
pub type RecordStream = BoxStream<'static, Result<RecordValue>>;

/// 📥 RecordDecoder — turns one object's bytes into records.
///
/// # Contract 📜
/// - Lazy: reading happens as the returned stream is polled.
/// - Finite: the stream ends when the object does.
/// - After yielding an `Err`, the stream ends.
pub trait RecordDecoder {
    fn decode(stream: ByteStream, key: String, max_buffer_size: usize) -> RecordStream;
}

/// 🏷️ Which decoder to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFormat {
    /// Fixed-size chunks of raw bytes.
    Bytes,
    /// One UTF-8 string per line.
    Lines,
    /// One JSON value per non-blank line.
    #[default]
    JsonLines,
}

/// 🗜️ Whether object content needs gunzipping first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    Gzip,
    /// Gzip for keys ending in `.gz`, plain otherwise.
    #[default]
    Auto,
}

impl Compression {
    pub fn applies_to(self, key: &str) -> bool {
        match self {
            Compression::None => false,
            Compression::Gzip => true,
            Compression::Auto => key.ends_with(".gz"),
        }
    }
}

// 🔧 TransformConfig — `[transform]` in the TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub format: TransformFormat,
    /// 📏 Chunk size for `bytes`, longest accepted line for `lines` / `json_lines`.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default)]
    pub compression: Compression,
}

fn default_max_buffer_size() -> usize {
    4096
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            format: TransformFormat::default(),
            max_buffer_size: default_max_buffer_size(),
            compression: Compression::default(),
        }
    }
}

/// 🎭 A configured transform. Cheap to clone, stateless between objects.
#[derive(Debug, Clone)]
pub struct Transformer {
    format: TransformFormat,
    max_buffer_size: usize,
    compression: Compression,
}

impl Transformer {
    pub fn new(config: &TransformConfig) -> Self {
        Self {
            format: config.format,
            max_buffer_size: config.max_buffer_size.max(1),
            compression: config.compression,
        }
    }

    /// 🔄 Decodes one object, skipping the first `skip_records` records.
    pub fn decode(&self, stream: ByteStream, context: &Context, skip_records: u64) -> RecordStream {
        let key = context.key.clone();
        let format = self.format;
        let max_buffer_size = self.max_buffer_size;
        trace!("🔄 decoding '{key}' as {format:?}, skipping {skip_records}");

        let stream: ByteStream = if self.compression.applies_to(&key) {
            Box::new(gzip::GunzipReader::new(stream))
        } else {
            stream
        };
        let records = decode_with(format, stream, key, max_buffer_size);

        skip_successes(records, skip_records)
    }
}

fn decode_with(format: TransformFormat, stream: ByteStream, key: String, max_buffer_size: usize) -> RecordStream {
    match format {
        TransformFormat::Bytes => BytesChunks::decode(stream, key, max_buffer_size),
        TransformFormat::Lines => TextLines::decode(stream, key, max_buffer_size),
        TransformFormat::JsonLines => JsonLines::decode(stream, key, max_buffer_size),
    }
}

/// ⏭️ Drops the first `skip` successful records. Errors always get through.
fn skip_successes(records: RecordStream, skip: u64) -> RecordStream {
    if skip == 0 {
        return records;
    }
    let mut remaining = skip;
    records
        .filter(move |record| {
            let keep = match record {
                Ok(_) if remaining > 0 => {
                    remaining -= 1;
                    false
                }
                _ => true,
            };
            ready(keep)
        })
        .boxed()
}

/// 🩺 Sorts read failures: bad bytes are the object's fault, anything else is the wire's.
pub(crate) fn read_error(key: &str, err: std::io::Error) -> SiphonError {
    if err.kind() == std::io::ErrorKind::InvalidData {
        SiphonError::Transform {
            key: key.to_string(),
            reason: err.to_string(),
        }
    } else {
        SiphonError::retryable(format!("reading '{key}' failed mid-stream: {err}"))
    }
}
