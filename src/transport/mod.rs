//! Messaging boundary
//!
//! The engine consumes MarketTick and Signal messages and publishes
//! ExecutionEvents; everything beyond these seams belongs to the ingestor,
//! the strategies, and the analytics service. The Redis adapter is the
//! deployment transport; the in-memory sink backs tests.

pub mod memory;
pub mod redis_bus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ExecutionEvent;
use crate::error::Result;

/// Downstream hand-off for execution events. At-least-once: callers retry
/// on failure, consumers dedup on fill id.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ExecutionEvent) -> Result<()>;
}

/// Cancel request arriving over the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
}

pub use memory::MemorySink;
pub use redis_bus::RedisBus;
