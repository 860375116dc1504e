//! 🎲 Distribution — who gets which object, decided without a single meeting.
//!
//! 🎬 COLD OPEN — INT. BUCKET — EVERY WORKER AT ONCE
//!
//! Ten workers list the same bucket. Ten workers see the same eleven million keys.
//! Exactly one of them may touch any given object, and none of them is allowed to
//! talk to the others about it. Coordination by arithmetic. Democracy by modulo.
//!
//! 🧠 Knowledge graph:
//! - [`DistributionMode`]: the tagged choice from config (`hash`, `filename_partition`,
//!   `path_partition`, `random`).
//! - [`TaskIdentity`]: `(task_id, max_tasks)`, validated so `task_id < max_tasks`.
//! - [`Subject`]: a raw key, or a [`Context`] the template already extracted.
//! - [`TaskAssignment`]: the trait. One method. Pure. Returns `Ok(false)` for "not mine",
//!   `Err` only when a promised partition turned out to be nonsense.
//! - [`DistributionStrategy`]: enum dispatch over the four variants, same shape as the
//!   source and sink backends.
//!
//! ⚠️ Every worker MUST share `(max_tasks, mode, template)`. Nobody checks. Arithmetic
//! does not forgive. 🦆

use std::fmt;

use serde::Deserialize;

use crate::error::{Result, SiphonError};
use crate::template::{Context, ContextExtractor};

pub(crate) mod filename_partition;
pub(crate) mod hash;
pub(crate) mod path_partition;
pub(crate) mod random;

pub use filename_partition::FilenamePartitionStrategy;
pub use hash::HashStrategy;
pub use path_partition::PathPartitionStrategy;
pub use random::RandomStrategy;

/// 🏷️ How objects are spread across tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// Hash of the object key. The default, because it needs nothing from you.
    #[default]
    Hash,
    /// Partition number embedded in the file name.
    FilenamePartition,
    /// Partition number as a path segment right after a fixed prefix.
    PathPartition,
    /// Hash of the raw key, template ignored.
    Random,
}

impl DistributionMode {
    /// 🔒 Partition modes cannot work without `{{partition}}` in the template.
    pub fn requires_partition(self) -> bool {
        matches!(
            self,
            DistributionMode::FilenamePartition | DistributionMode::PathPartition
        )
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistributionMode::Hash => "hash",
            DistributionMode::FilenamePartition => "filename_partition",
            DistributionMode::PathPartition => "path_partition",
            DistributionMode::Random => "random",
        };
        f.write_str(name)
    }
}

/// 🪪 Which worker am I, and how many of us are there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskIdentity {
    task_id: u32,
    max_tasks: u32,
}

impl TaskIdentity {
    /// 🔧 Validates `max_tasks > 0` and `task_id < max_tasks`. Task ids are 0-based.
    pub fn new(task_id: u32, max_tasks: u32) -> Result<Self> {
        if max_tasks == 0 {
            return Err(SiphonError::Configuration(
                "max_tasks must be at least 1".to_string(),
            ));
        }
        if task_id >= max_tasks {
            return Err(SiphonError::Configuration(format!(
                "task_id {task_id} is out of range for max_tasks {max_tasks} (valid ids are 0..{max_tasks})"
            )));
        }
        Ok(Self { task_id, max_tasks })
    }

    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    pub fn max_tasks(&self) -> u32 {
        self.max_tasks
    }

    /// 🧮 The one rule the partition strategies share.
    pub fn owns_partition(&self, partition: u32) -> bool {
        to_be_processed_by_this_task(self.task_id, self.max_tasks, partition)
    }
}

/// 🧮 `partition % max_tasks == task_id`. Callers guarantee `max_tasks > 0`.
pub fn to_be_processed_by_this_task(task_id: u32, max_tasks: u32, partition: u32) -> bool {
    partition % max_tasks == task_id
}

/// 🎯 What a strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Key(&'a str),
    Context(&'a Context),
}

impl<'a> Subject<'a> {
    /// 🗝️ The object key, whichever way the subject arrived.
    pub fn key(&self) -> &'a str {
        match self {
            Subject::Key(key) => key,
            Subject::Context(context) => &context.key,
        }
    }
}

/// ⚖️ Decides whether an object belongs to this task.
///
/// # Contract
/// - Pure: same compiled strategy + same input ⇒ same answer.
/// - `Ok(false)` covers both "someone else's" and "doesn't fit the layout".
/// - `Err(SiphonError::Parse)` only when the key promised a partition and lied.
pub trait TaskAssignment: fmt::Debug {
    fn is_part_of_task(&self, task: TaskIdentity, subject: Subject<'_>) -> Result<bool>;
}

/// 🎭 The four faces of object ownership.
#[derive(Debug, Clone)]
pub enum DistributionStrategy {
    Hash(HashStrategy),
    FilenamePartition(FilenamePartitionStrategy),
    PathPartition(PathPartitionStrategy),
    Random(RandomStrategy),
}

impl TaskAssignment for DistributionStrategy {
    fn is_part_of_task(&self, task: TaskIdentity, subject: Subject<'_>) -> Result<bool> {
        match self {
            DistributionStrategy::Hash(strategy) => strategy.is_part_of_task(task, subject),
            DistributionStrategy::FilenamePartition(strategy) => strategy.is_part_of_task(task, subject),
            DistributionStrategy::PathPartition(strategy) => strategy.is_part_of_task(task, subject),
            DistributionStrategy::Random(strategy) => strategy.is_part_of_task(task, subject),
        }
    }
}

impl DistributionStrategy {
    /// 🏗️ Builds the strategy for `mode`. Partition modes need the compiled extractor.
    pub fn for_mode(mode: DistributionMode, extractor: &ContextExtractor) -> Result<Self> {
        Ok(match mode {
            DistributionMode::Hash => DistributionStrategy::Hash(HashStrategy),
            DistributionMode::Random => DistributionStrategy::Random(RandomStrategy),
            DistributionMode::FilenamePartition => DistributionStrategy::FilenamePartition(
                FilenamePartitionStrategy::new(extractor.clone()),
            ),
            DistributionMode::PathPartition => {
                let prefix = extractor
                    .template()
                    .and_then(|template| template.partition_prefix())
                    .ok_or_else(|| {
                        SiphonError::Configuration(
                            "path_partition needs a template containing {{partition}}".to_string(),
                        )
                    })?;
                DistributionStrategy::PathPartition(PathPartitionStrategy::new(prefix))
            }
        })
    }
}

// 🔧 DistributionConfig — lives next to the strategies it configures, same as the backend
// configs live next to their backends.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub mode: DistributionMode,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub task_id: u32,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: u32,
    /// 📮 Topic to stamp on records when the template carries no `{{topic}}`.
    #[serde(default)]
    pub target_topic: Option<String>,
}

fn default_max_tasks() -> u32 {
    1
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            mode: DistributionMode::default(),
            template: None,
            task_id: 0,
            max_tasks: default_max_tasks(),
            target_topic: None,
        }
    }
}

/// 📦 Everything the iterator needs to decide "mine or not", compiled once.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub task: TaskIdentity,
    pub extractor: ContextExtractor,
    pub strategy: DistributionStrategy,
}

impl DistributionConfig {
    /// ✅ Validates the identity and compiles template + strategy. All-or-nothing.
    pub fn validate(&self) -> Result<Distribution> {
        let task = TaskIdentity::new(self.task_id, self.max_tasks)?;
        let extractor =
            ContextExtractor::compile(self.template.as_deref(), self.mode, self.target_topic.clone())?;
        let strategy = DistributionStrategy::for_mode(self.mode, &extractor)?;
        Ok(Distribution {
            task,
            extractor,
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_task_identity_refuses_impossible_jobs() {
        assert!(matches!(TaskIdentity::new(0, 0), Err(SiphonError::Configuration(_))));
        assert!(matches!(TaskIdentity::new(3, 3), Err(SiphonError::Configuration(_))));
        assert!(TaskIdentity::new(2, 3).is_ok());
    }

    #[test]
    fn the_one_where_modulo_is_the_whole_org_chart() {
        assert!(to_be_processed_by_this_task(1, 4, 5));
        assert!(!to_be_processed_by_this_task(0, 4, 5));
        assert!(to_be_processed_by_this_task(0, 1, 42));
    }

    #[test]
    fn the_one_where_validate_compiles_the_whole_kit() -> anyhow::Result<()> {
        let the_config = DistributionConfig {
            mode: DistributionMode::PathPartition,
            template: Some("topics/logs/{{partition}}/".to_string()),
            task_id: 1,
            max_tasks: 4,
            target_topic: None,
        };
        let the_distribution = the_config.validate()?;
        assert_eq!(the_distribution.task.task_id(), 1);
        assert!(matches!(the_distribution.strategy, DistributionStrategy::PathPartition(_)));
        Ok(())
    }

    #[test]
    fn the_one_where_partition_modes_without_a_template_never_boot() {
        for mode in [DistributionMode::FilenamePartition, DistributionMode::PathPartition] {
            let the_config = DistributionConfig {
                mode,
                template: Some("logs-{{start_offset}}".to_string()),
                ..DistributionConfig::default()
            };
            assert!(matches!(the_config.validate(), Err(SiphonError::Configuration(_))), "{mode}");
        }
    }

    #[test]
    fn the_one_where_every_strategy_crowns_exactly_one_owner() -> anyhow::Result<()> {
        let the_configs = [
            (DistributionMode::Hash, None),
            (DistributionMode::Random, None),
            (DistributionMode::FilenamePartition, Some("logs-{{partition}}-{{start_offset}}")),
            (DistributionMode::PathPartition, Some("topics/logs/{{partition}}/")),
        ];
        let the_keys = [
            "topics/logs/0/logs-0-0002.txt",
            "topics/logs/7/logs-7-1002.txt",
            "topics/logs/13/logs-13-0.txt",
            "topics/logs/4/logs-4-99.txt",
        ];
        for (mode, template) in the_configs {
            for key in the_keys {
                let mut the_owners = 0;
                for task_id in 0..10 {
                    let the_distribution = DistributionConfig {
                        mode,
                        template: template.map(str::to_string),
                        task_id,
                        max_tasks: 10,
                        target_topic: None,
                    }
                    .validate()?;
                    let Some(the_context) = the_distribution.extractor.extract(key)? else {
                        continue;
                    };
                    if the_distribution
                        .strategy
                        .is_part_of_task(the_distribution.task, Subject::Context(&the_context))?
                    {
                        the_owners += 1;
                    }
                }
                assert_eq!(the_owners, 1, "{mode} should crown exactly one owner for {key}");
            }
        }
        Ok(())
    }

    #[test]
    fn the_one_where_the_mode_reads_like_the_config_says() -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Wrapper {
            distribution: DistributionConfig,
        }
        let the_wrapper: Wrapper = toml::from_str(
            r#"
            [distribution]
            mode = "filename_partition"
            template = "logs-{{partition}}-{{start_offset}}"
            task_id = 2
            max_tasks = 3
            "#,
        )?;
        assert_eq!(the_wrapper.distribution.mode, DistributionMode::FilenamePartition);
        assert_eq!(the_wrapper.distribution.max_tasks, 3);
        Ok(())
    }
}
