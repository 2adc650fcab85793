//! Event publisher
//!
//! Drains the coordinator's event channel and hands each event to the
//! trade store and the outbound sink with bounded retry and exponential
//! backoff. Runs as its own task so a slow or failing boundary never
//! blocks partition progress; the engine's authoritative state is never
//! rolled back for a failed hand-off.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::domain::ExecutionEvent;
use crate::persistence::TradeStore;
use crate::services::Metrics;
use crate::transport::EventSink;

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 5_000;

pub struct EventPublisher {
    store: Option<Arc<TradeStore>>,
    sink: Option<Arc<dyn EventSink>>,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(
        store: Option<Arc<TradeStore>>,
        sink: Option<Arc<dyn EventSink>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            sink,
            metrics,
        }
    }

    /// Spawn the publisher loop. Exits when the event channel closes.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<ExecutionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                store = self.store.is_some(),
                sink = self.sink.is_some(),
                "event publisher started"
            );
            while let Some(event) = rx.recv().await {
                self.deliver(&event).await;
            }
            info!("event publisher stopped");
        })
    }

    async fn deliver(&self, event: &ExecutionEvent) {
        for attempt in 0..MAX_ATTEMPTS {
            match self.try_deliver(event).await {
                Ok(()) => {
                    self.metrics.inc_events_published();
                    return;
                }
                Err(e) => {
                    let backoff = (BASE_BACKOFF_MS << attempt).min(MAX_BACKOFF_MS);
                    warn!(
                        event = event.event_type(),
                        order_id = %event.order_id(),
                        attempt = attempt + 1,
                        "event hand-off failed, retrying in {}ms: {}",
                        backoff,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
        // The trade store dedups on fill id, so whichever attempts landed
        // are safe; anything missing is rebuilt by analytics backfill
        self.metrics.inc_event_failures();
        error!(
            event = event.event_type(),
            order_id = %event.order_id(),
            "event dropped after {} attempts",
            MAX_ATTEMPTS
        );
    }

    async fn try_deliver(&self, event: &ExecutionEvent) -> crate::error::Result<()> {
        if let Some(store) = &self.store {
            store.append(event).await?;
        }
        if let Some(sink) = &self.sink {
            sink.publish(event).await?;
        }
        Ok(())
    }
}
