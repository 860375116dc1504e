//! 📛 Filename partition — the partition number is hiding in the file name.
//!
//! `logs-7-000112.gz` belongs to partition 7, which belongs to task `7 % max_tasks`.
//! Keys that don't fit the template are not an error, just not ours, and we say so at warn.

use tracing::warn;

use super::{Subject, TaskAssignment, TaskIdentity};
use crate::error::Result;
use crate::template::ContextExtractor;

/// 🔎 Holds its own compiled extractor, so a raw key is as good as a context.
#[derive(Debug, Clone)]
pub struct FilenamePartitionStrategy {
    extractor: ContextExtractor,
}

impl FilenamePartitionStrategy {
    pub fn new(extractor: ContextExtractor) -> Self {
        Self { extractor }
    }
}

impl TaskAssignment for FilenamePartitionStrategy {
    fn is_part_of_task(&self, task: TaskIdentity, subject: Subject<'_>) -> Result<bool> {
        let partition = match subject {
            Subject::Context(context) => context.partition,
            Subject::Key(key) => self
                .extractor
                .extract(key)?
                .and_then(|context| context.partition),
        };
        match partition {
            Some(partition) => Ok(task.owns_partition(partition)),
            None => {
                warn!(
                    "⚠️ unable to find a partition in '{}' using template '{}', skipping it",
                    subject.key(),
                    self.extractor
                        .template()
                        .map(|template| template.as_str())
                        .unwrap_or_default()
                );
                Ok(false)
            }
        }
    }
}
