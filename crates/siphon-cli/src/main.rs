//! 🚀 siphon-cli — the front door, the bouncer, the maitre d' of siphon.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, applies the command-line overrides, sets up logging, wires Ctrl-C to the
//! stop flag, and lets the library do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 🪣 Read a bucket's share of objects, one task out of many.
#[derive(Debug, Parser)]
#[command(name = "siphon", version, about)]
struct Cli {
    /// 📄 Config file. Defaults to `siphon.toml` if it exists; env vars (`SIPHON_*`) always apply.
    config: Option<PathBuf>,

    /// 🧩 This worker's id, 0-based. Overrides `[distribution] task_id`.
    #[arg(long)]
    task_id: Option<u32>,

    /// 🧮 How many workers share the bucket. Overrides `[distribution] max_tasks`.
    #[arg(long)]
    max_tasks: Option<u32>,

    /// 🏁 One pass over the bucket, then exit.
    #[arg(long)]
    once: bool,
}

/// 🔍 An explicit path must exist. The default is optional, like my gym membership.
fn resolve_config_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!(
                    "💀 Couldn't check whether the configuration file exists. If it's a relative path, \
                     double check the cwd, or use an absolute path. Was checking here: '{}'",
                    path.display()
                )
            })?;
            if !exists {
                anyhow::bail!("💀 Configuration file '{}' does not exist", path.display());
            }
            Ok(Some(path))
        }
        None => {
            let the_default = PathBuf::from("siphon.toml");
            Ok(the_default.is_file().then_some(the_default))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path(cli.config)?;
    let mut app_config = siphon::app_config::load_config(config_path.as_deref())
        .context("💀 Couldn't load the configuration. Take a look at the file and the SIPHON_* env vars")?;

    if let Some(task_id) = cli.task_id {
        app_config.distribution.task_id = task_id;
    }
    if let Some(max_tasks) = cli.max_tasks {
        app_config.distribution.max_tasks = max_tasks;
    }
    if cli.once {
        app_config.runtime.run_once = true;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let the_flag = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Ctrl-C received, finishing the current batch and stopping");
                the_flag.store(true, Ordering::Relaxed);
            }
            Err(err) => error!("💀 could not listen for Ctrl-C: {err}"),
        }
    });

    let summary = siphon::run_until(app_config, stop).await?;
    info!(
        "✅ done: {} record(s) written in {:?}",
        summary.records_written, summary.elapsed
    );
    println!("{}", summary.render());
    Ok(())
}

#[tokio::main]
async fn main() {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run(Cli::parse()).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        // 🗑️ Exit with prejudice. Process exitus maximus.
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_flags_override_nothing_until_given() {
        let the_cli = Cli::parse_from(["siphon"]);
        assert!(the_cli.config.is_none());
        assert!(the_cli.task_id.is_none());
        assert!(!the_cli.once);

        let the_cli = Cli::parse_from(["siphon", "bucket.toml", "--task-id", "2", "--max-tasks", "5", "--once"]);
        assert_eq!(the_cli.config, Some(PathBuf::from("bucket.toml")));
        assert_eq!(the_cli.task_id, Some(2));
        assert_eq!(the_cli.max_tasks, Some(5));
        assert!(the_cli.once);
    }

    #[test]
    fn the_one_where_a_missing_explicit_config_is_an_error() {
        let the_result = resolve_config_path(Some(PathBuf::from("/definitely/not/here/siphon.toml")));
        assert!(the_result.is_err());
    }
}
