//! 💀 SiphonError — the ways the core can let you down, sorted by how loudly.
//!
//! The app layer speaks `anyhow`. The core does not, because the poll loop has to
//! tell a retryable hiccup apart from a config that was wrong since birth, and
//! string-sniffing error chains at 3am is how we got the cli's connection-hint code.
//!
//! 🧠 Knowledge graph:
//! - `Configuration`: bad template, bad task identity. Fatal at startup. Never retried.
//! - `Parse`: a partition we were promised turned out to be garbage. Fatal. Halts the worker.
//! - `Remote`: the object store sneezed. `retryable` decides if we back off or give up.
//! - `Vanished`: listed, then deleted before the fetch. The iterator skips it.
//! - `Checkpoint` / `Transform` / `Io`: the supporting cast.
//!
//! NoMatch and NotOwned are NOT errors. They are `Option::None` and `false`. 🦆

use thiserror::Error;

/// 📦 Everything the core can raise. `Result<T>` below is the house alias.
#[derive(Debug, Error)]
pub enum SiphonError {
    /// 🔧 The configuration can never work. Fix the TOML, not the code.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 🧨 A value that matched a numeric slot did not parse as a number.
    #[error("unable to parse partition from '{key}': {reason}")]
    Parse { key: String, reason: String },

    /// 📡 The object store (or its stand-in) failed a list or fetch call.
    #[error("remote error ({}): {message}", remote_kind(.retryable))]
    Remote { message: String, retryable: bool },

    /// 👻 The object was listed, then gone by the time we asked for its bytes. Not an error
    /// worth retrying: the next listing simply won't have it.
    #[error("object '{key}' vanished between listing and fetch")]
    Vanished { key: String },

    /// 📒 The checkpoint backend could not read or write progress.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// 🔄 Object bytes could not be decoded into records.
    #[error("transform error for '{key}': {reason}")]
    Transform { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SiphonError {
    /// 🔁 Only remote errors flagged retryable earn a second chance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SiphonError::Remote { retryable: true, .. })
    }

    pub(crate) fn retryable(message: impl Into<String>) -> Self {
        SiphonError::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    pub(crate) fn fatal_remote(message: impl Into<String>) -> Self {
        SiphonError::Remote {
            message: message.into(),
            retryable: false,
        }
    }
}

fn remote_kind(retryable: &bool) -> &'static str {
    if *retryable { "retryable" } else { "fatal" }
}

pub type Result<T> = std::result::Result<T, SiphonError>;
