//! 🪣 siphon — split an object-store bucket across N workers, read each object exactly once
//! per worker that owns it, and remember where you stopped.
//!
//! 🎬 *[narrator voice]* "Eleven thousand objects. Ten workers. Zero coordination."
//!
//! 🧠 Knowledge graph:
//! - [`template`]: key template → `Context` (topic, partition, start offset).
//! - [`distribution`]: `Context` → "is this mine?" for task `i` of `N`.
//! - [`checkpoint`]: per-object progress, cached and preloaded a page at a time.
//! - [`iterator`]: list → match → claim → resume → fetch → decode → emit.
//! - [`backends`], [`transforms`], [`sinks`]: the pluggable ends.
//! - `supervisors` (private): the poll loop that drives it all from an [`AppConfig`].
//!
//! 🦆 The duck has been distributed. Each worker gets a different part of the duck.

pub mod app_config;
pub mod backends;
pub mod checkpoint;
pub mod common;
pub mod distribution;
pub mod error;
pub mod iterator;
mod progress;
pub mod sinks;
mod supervisors;
pub mod template;
pub mod transforms;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};

pub use app_config::{AppConfig, RuntimeConfig};
pub use error::SiphonError;
pub use supervisors::RunSummary;
use supervisors::Supervisor;

/// 🚀 Runs until the source worker finishes (`run_once`) or fails.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    run_until(app_config, Arc::new(AtomicBool::new(false))).await
}

/// 🛑 Like [`run`], but stops between batches once `stop` flips to `true`.
pub async fn run_until(app_config: AppConfig, stop: Arc<AtomicBool>) -> Result<RunSummary> {
    Supervisor::new(app_config, stop)
        .start_workers()
        .await
        .context("Failed to run the siphon workers")
}
