//! 🗂️ Path partition — the partition is a directory, right after a fixed prefix.
//!
//! Template `topics/logs/{{partition}}/` means `topics/logs/5/whatever.txt` is partition 5.
//! Three outcomes, kept separate on purpose:
//! - prefix missing, or no `/` after the segment → not ours, warn, move on
//! - segment is a number → modulo decides
//! - segment is not a number → [`SiphonError::Parse`], the layout is lying to us

use tracing::warn;

use super::{Subject, TaskAssignment, TaskIdentity};
use crate::error::{Result, SiphonError};

#[derive(Debug, Clone)]
pub struct PathPartitionStrategy {
    prefix: String,
}

impl PathPartitionStrategy {
    /// 🔧 `prefix` is the template text before `{{partition}}`, verbatim.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// ✂️ Pulls the partition segment out of `key`. `Ok(None)` when the key is not laid out
    /// under the prefix.
    pub(crate) fn partition_of(&self, key: &str) -> Result<Option<u32>> {
        let Some(rest) = key.strip_prefix(self.prefix.as_str()) else {
            warn!("⚠️ '{key}' does not start with the path prefix '{}', skipping it", self.prefix);
            return Ok(None);
        };
        let Some((segment, _)) = rest.split_once('/') else {
            warn!(
                "⚠️ '{key}' has no '/' after the partition segment under '{}', skipping it",
                self.prefix
            );
            return Ok(None);
        };
        segment.parse::<u32>().map(Some).map_err(|err| SiphonError::Parse {
            key: key.to_string(),
            reason: format!("path segment '{segment}' after prefix '{}' is not a partition: {err}", self.prefix),
        })
    }
}

impl TaskAssignment for PathPartitionStrategy {
    fn is_part_of_task(&self, task: TaskIdentity, subject: Subject<'_>) -> Result<bool> {
        Ok(self
            .partition_of(subject.key())?
            .is_some_and(|partition| task.owns_partition(partition)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_directory_is_the_partition() -> anyhow::Result<()> {
        let the_cases = [
            (0, 10, "topics/logs/0/logs-0-0002.txt", true),
            (1, 10, "topics/logs/1/logs-1-0002.txt", true),
            (0, 10, "topics/logs/10/logs-10-0002.txt", true),
            (7, 10, "topics/logs/17/logs-17-0002.txt", true),
            (3, 10, "topics/logs/3/logs-3-0002.txt", true),
            (4, 20, "topics/logs/24/logs-24-0002.txt", true),
            (1, 10, "topics/logs/0/logs-0-0002.txt", false),
            (0, 10, "topics/logs/7/logs-7-0002.txt", false),
        ];
        let the_strategy = PathPartitionStrategy::new("topics/logs/");
        for (task_id, max_tasks, key, expected) in the_cases {
            let the_task = TaskIdentity::new(task_id, max_tasks)?;
            assert_eq!(the_strategy.is_part_of_task(the_task, Subject::Key(key))?, expected, "{key}");
        }
        Ok(())
    }

    #[test]
    fn the_one_where_keys_outside_the_layout_are_politely_declined() -> anyhow::Result<()> {
        let the_strategy = PathPartitionStrategy::new("topics/logs/");
        let the_task = TaskIdentity::new(0, 1)?;
        assert!(!the_strategy.is_part_of_task(the_task, Subject::Key("prod/logs/0/logs-0-0002.txt"))?);
        assert!(!the_strategy.is_part_of_task(the_task, Subject::Key("topics/logs/0"))?);
        Ok(())
    }

    #[test]
    fn the_one_where_a_word_where_a_number_should_be_stops_the_show() -> anyhow::Result<()> {
        let the_strategy = PathPartitionStrategy::new("topics/logs/");
        let the_task = TaskIdentity::new(0, 2)?;
        let the_result = the_strategy.is_part_of_task(the_task, Subject::Key("topics/logs/one/test.txt"));
        assert!(matches!(the_result, Err(SiphonError::Parse { .. })));
        Ok(())
    }

    #[test]
    fn the_one_where_the_prefix_can_carry_placeholder_looking_text() -> anyhow::Result<()> {
        let the_strategy = PathPartitionStrategy::new("topics/{{topic}}/partition=");
        let the_task = TaskIdentity::new(1, 2)?;
        assert!(the_strategy.is_part_of_task(the_task, Subject::Key("topics/{{topic}}/partition=3/a.txt"))?);
        Ok(())
    }
}
