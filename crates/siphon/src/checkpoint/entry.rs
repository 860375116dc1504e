//! 📒 CheckpointEntry — a property bag with opinions about a few of its keys.
//!
//! 🧠 Knowledge graph:
//! - The whole entry IS its property map. `from_properties(entry.properties()) == entry`, always.
//! - `PartitionIdentity` is the sorted subset (`bucket`, `object_key`, `topic`, `partition`)
//!   that names the entry. Same fields whether built fresh or read back from disk.
//! - `record_count` only goes up. `completed` only goes from false to true.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SiphonError};
use crate::template::Context;

pub const BUCKET: &str = "bucket";
pub const OBJECT_KEY: &str = "object_key";
pub const TOPIC: &str = "topic";
pub const PARTITION: &str = "partition";
pub const RECORD_COUNT: &str = "record_count";
pub const COMPLETED: &str = "completed";

const IDENTITY_FIELDS: [&str; 4] = [BUCKET, OBJECT_KEY, TOPIC, PARTITION];

/// 🗃️ The raw persisted shape.
pub type Properties = BTreeMap<String, Value>;

/// 🪪 Names a checkpoint. Order-independent because it is a sorted map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionIdentity(BTreeMap<String, String>);

impl PartitionIdentity {
    /// 🔧 The identity of a freshly listed object.
    pub fn for_object(bucket: &str, context: &Context) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(BUCKET.to_string(), bucket.to_string());
        fields.insert(OBJECT_KEY.to_string(), context.key.clone());
        if let Some(topic) = &context.topic {
            fields.insert(TOPIC.to_string(), topic.clone());
        }
        if let Some(partition) = context.partition {
            fields.insert(PARTITION.to_string(), partition.to_string());
        }
        Self(fields)
    }

    /// 🔁 The identity of something read back from a backend.
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut fields = BTreeMap::new();
        for field in IDENTITY_FIELDS {
            if let Some(value) = properties.get(field) {
                fields.insert(field.to_string(), identity_string(value));
            }
        }
        for required in [BUCKET, OBJECT_KEY] {
            if !fields.contains_key(required) {
                return Err(SiphonError::Checkpoint(format!(
                    "checkpoint properties are missing '{required}': {properties:?}"
                )));
            }
        }
        Ok(Self(fields))
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl fmt::Display for PartitionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{field}={value}")?;
            first = false;
        }
        Ok(())
    }
}

fn identity_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// 📍 Progress through one object.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointEntry {
    properties: Properties,
}

impl CheckpointEntry {
    /// 🌱 A brand-new entry: nothing read yet, nothing completed.
    pub fn new(bucket: &str, context: &Context) -> Self {
        let mut properties = Properties::new();
        properties.insert(BUCKET.to_string(), Value::from(bucket));
        properties.insert(OBJECT_KEY.to_string(), Value::from(context.key.as_str()));
        if let Some(topic) = &context.topic {
            properties.insert(TOPIC.to_string(), Value::from(topic.as_str()));
        }
        if let Some(partition) = context.partition {
            properties.insert(PARTITION.to_string(), Value::from(partition));
        }
        properties.insert(RECORD_COUNT.to_string(), Value::from(0u64));
        Self { properties }
    }

    /// 🔁 Rebuilds an entry from persisted properties. Rejects maps that cannot name themselves
    /// or whose counters are not counters.
    pub fn from_properties(properties: Properties) -> Result<Self> {
        PartitionIdentity::from_properties(&properties)?;
        if let Some(count) = properties.get(RECORD_COUNT) {
            if count.as_u64().is_none() {
                return Err(SiphonError::Checkpoint(format!(
                    "'{RECORD_COUNT}' must be a non-negative integer, found {count}"
                )));
            }
        }
        if let Some(completed) = properties.get(COMPLETED) {
            if !completed.is_boolean() {
                return Err(SiphonError::Checkpoint(format!(
                    "'{COMPLETED}' must be a boolean, found {completed}"
                )));
            }
        }
        Ok(Self { properties })
    }

    pub fn properties(&self) -> Properties {
        self.properties.clone()
    }

    pub fn as_properties(&self) -> &Properties {
        &self.properties
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn identity(&self) -> PartitionIdentity {
        let mut fields = BTreeMap::new();
        for field in IDENTITY_FIELDS {
            if let Some(value) = self.properties.get(field) {
                fields.insert(field.to_string(), identity_string(value));
            }
        }
        PartitionIdentity(fields)
    }

    pub fn object_key(&self) -> Option<&str> {
        self.properties.get(OBJECT_KEY).and_then(Value::as_str)
    }

    pub fn record_count(&self) -> u64 {
        self.properties
            .get(RECORD_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// ➕ Bumps the counter and returns the new value.
    pub fn increment_record_count(&mut self) -> u64 {
        let next = self.record_count().saturating_add(1);
        self.properties.insert(RECORD_COUNT.to_string(), Value::from(next));
        next
    }

    pub fn mark_completed(&mut self) {
        self.properties.insert(COMPLETED.to_string(), Value::Bool(true));
    }

    pub fn is_completed(&self) -> bool {
        self.properties
            .get(COMPLETED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 🤝 Union-merge: `other` wins on shared keys, keys only we have survive.
    /// The counter never goes backwards and completion is never undone.
    pub fn merge_from(&mut self, other: &CheckpointEntry) {
        let count = self.record_count().max(other.record_count());
        let completed = self.is_completed() || other.is_completed();
        self.properties
            .extend(other.properties.iter().map(|(name, value)| (name.clone(), value.clone())));
        self.properties.insert(RECORD_COUNT.to_string(), Value::from(count));
        if completed {
            self.mark_completed();
        }
    }
}
