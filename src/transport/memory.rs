//! In-process event sink for tests and local runs without Redis.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::EventSink;
use crate::domain::ExecutionEvent;
use crate::error::Result;

/// Collects published events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    pub async fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().await.clone()
    }

    /// Drain and return published events.
    pub async fn take(&self) -> Vec<ExecutionEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: &ExecutionEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
