//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of self-harm.
//!
//! 🧠 Knowledge graph:
//! - Each section's struct lives next to the code it configures (`backends::SourceConfig`,
//!   `distribution::DistributionConfig`, `transforms::TransformConfig`,
//!   `checkpoint::CheckpointConfig`, `sinks::SinkConfig`). This file just stitches them.
//! - `RuntimeConfig` is the poll loop's knobs, and it lives here because the poll loop
//!   has no other home that isn't private.
//! - Env vars: `SIPHON_` prefix, `__` for nesting: `SIPHON_DISTRIBUTION__TASK_ID=3`.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::backends::SourceConfig;
use crate::checkpoint::CheckpointConfig;
use crate::distribution::DistributionConfig;
use crate::sinks::SinkConfig;
use crate::transforms::TransformConfig;

/// 📦 One struct to rule them all, one struct to find them, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source_config: SourceConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub checkpoint_config: CheckpointConfig,
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// ⏱️ How the poll loop paces itself.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 📦 Records per batch handed to the sink.
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
    /// 💤 How long to wait after a full pass found nothing more.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 🔁 How long to back off after a retryable remote error.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// 📬 Batches in flight between the source and sink workers.
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    /// 🏁 Stop after the first full pass instead of polling forever.
    #[serde(default)]
    pub run_once: bool,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_max_poll_records() -> usize {
    500
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_error_backoff_ms() -> u64 {
    1_000
}

fn default_queue_capacity() -> usize {
    10
}

fn default_show_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_poll_records: default_max_poll_records(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            queue_capacity: default_queue_capacity(),
            run_once: false,
            show_progress: default_show_progress(),
        }
    }
}

/// 🚀 Load the config: env vars (`SIPHON_*`) merged with an optional TOML file. TOML wins.
///
/// 📐 No file → env vars only. No assumptions about a default file name here, that's the
/// CLI's business.
///
/// 💀 Returns an error if the config is unparseable, with a message saying where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("SIPHON_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SIPHON_*). \
             The file exists in our hearts, but apparently not on disk, or not in this shape.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SIPHON_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
