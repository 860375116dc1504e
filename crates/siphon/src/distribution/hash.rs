//! #️⃣ Hash distribution — the object key goes in, a task id comes out.
//!
//! Uses the same 31-multiplier string hash the JVM connectors use, so a fleet that
//! switches from one to the other keeps its object-to-task layout. Floor-mod keeps
//! negative hashes from picking negative tasks. 🦆

use tracing::trace;

use super::{Subject, TaskAssignment, TaskIdentity};
use crate::error::Result;

/// 🎲 Owns an object iff `floor_mod(string_hash(key), max_tasks) == task_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashStrategy;

impl TaskAssignment for HashStrategy {
    fn is_part_of_task(&self, task: TaskIdentity, subject: Subject<'_>) -> Result<bool> {
        let key = subject.key();
        let bucket = java_string_hash(key).rem_euclid(task.max_tasks() as i64);
        trace!("#️⃣ key '{key}' hashes to task {bucket}");
        Ok(bucket == task.task_id() as i64)
    }
}

/// 🔢 `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 code units, wrapping at 32 bits.
pub(crate) fn java_string_hash(key: &str) -> i64 {
    let hash = key
        .encode_utf16()
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(unit as i32));
    hash as i64
}
