//! 🎰 Random distribution — "random" the way a casino is random: stable, boring, and
//! rigged so every key lands on exactly one table.
//!
//! Ignores templates entirely. Hashes the raw key bytes with 64-bit FNV-1a, which is
//! stable across toolchains and restarts, so the same key always goes home to the same task.
//!
//! Random and hash mode deliberately disagree: hash mode keeps the JVM `String.hashCode`
//! layout so a mixed fleet agrees on owners, random mode only promises a stable, even spread.
//! Switching a running fleet between the two reshuffles ownership.

use tracing::trace;

use super::{Subject, TaskAssignment, TaskIdentity};
use crate::error::Result;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStrategy;

impl TaskAssignment for RandomStrategy {
    fn is_part_of_task(&self, task: TaskIdentity, subject: Subject<'_>) -> Result<bool> {
        let key = subject.key();
        let bucket = fnv1a64(key.as_bytes()) % u64::from(task.max_tasks());
        trace!("🎰 key '{key}' rolled task {bucket}");
        Ok(bucket == u64::from(task.task_id()))
    }
}

pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
