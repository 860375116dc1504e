//! 📦 A sink that never forgets. For tests, and for the kind of demo that ends with `{:#?}`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Sink;
use crate::common::SourceRecord;

/// 🔒 Records behind an `Arc<Mutex<...>>`. Clone-able because tests need to peek inside after
/// handing `self` off to the pipeline.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    received: Arc<Mutex<Vec<SourceRecord>>>,
    closed: Arc<AtomicBool>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<SourceRecord> {
        self.received.lock().await.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn receive(&mut self, records: Vec<SourceRecord>) -> Result<()> {
        self.received.lock().await.extend(records);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // 🗑️ nothing to flush, RAM is as durable as it gets in here
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
