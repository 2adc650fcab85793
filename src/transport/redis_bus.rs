//! Redis pub/sub adapter
//!
//! Ticks arrive on `market_data`, signals on `trading_signals`, cancel
//! requests on the control channel, and committed execution events go out
//! on `execution_events`. Delivery is at-least-once with possible
//! reordering; the engine's sequence guard and deduplicator absorb both.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::{CancelRequest, EventSink};
use crate::config::TransportConfig;
use crate::domain::{ExecutionEvent, MarketTick, SignalMessage};
use crate::engine::ExecutionCoordinator;
use crate::error::Result;
use crate::services::HealthState;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct RedisBus {
    client: redis::Client,
    config: TransportConfig,
    publish_conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisBus {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            publish_conn: RwLock::new(None),
        })
    }

    /// Verify connectivity with a PING.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Consume MarketTick messages until shutdown, reconnecting on
    /// connection loss. Undecodable payloads are logged and skipped.
    pub async fn run_tick_consumer(
        &self,
        coordinator: Arc<ExecutionCoordinator>,
        health: Arc<HealthState>,
    ) {
        let channel = self.config.tick_channel.clone();
        loop {
            if !coordinator.is_accepting() {
                break;
            }
            match self.subscribe(&channel).await {
                Ok(mut pubsub) => {
                    info!(%channel, "subscribed for market ticks");
                    health.set_redis_connected(true);
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                debug!("unreadable tick payload: {}", e);
                                continue;
                            }
                        };
                        match serde_json::from_str::<MarketTick>(&payload) {
                            Ok(tick) => {
                                health.record_tick().await;
                                if let Err(e) = coordinator.handle_tick(tick) {
                                    warn!("tick dropped: {}", e);
                                }
                            }
                            Err(e) => debug!("undecodable tick: {}", e),
                        }
                    }
                    warn!(%channel, "tick subscription ended, reconnecting");
                }
                Err(e) => {
                    error!(%channel, "tick subscribe failed: {}", e);
                }
            }
            health.set_redis_connected(false);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Consume Signal messages until shutdown. Duplicate and HOLD signals
    /// are idempotent no-ops inside the coordinator; a partition admission
    /// failure is retried here rather than processed out of order.
    pub async fn run_signal_consumer(
        &self,
        coordinator: Arc<ExecutionCoordinator>,
        health: Arc<HealthState>,
    ) {
        let channel = self.config.signal_channel.clone();
        loop {
            if !coordinator.is_accepting() {
                break;
            }
            match self.subscribe(&channel).await {
                Ok(mut pubsub) => {
                    info!(%channel, "subscribed for trading signals");
                    health.set_redis_connected(true);
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                debug!("unreadable signal payload: {}", e);
                                continue;
                            }
                        };
                        match serde_json::from_str::<SignalMessage>(&payload) {
                            Ok(message) => {
                                let mut attempt = 0u32;
                                loop {
                                    match coordinator.handle_signal_message(message.clone()) {
                                        Ok(()) => break,
                                        Err(e) if attempt < 3 => {
                                            attempt += 1;
                                            warn!(
                                                "signal admission failed (attempt {}): {}",
                                                attempt, e
                                            );
                                            tokio::time::sleep(Duration::from_millis(
                                                100 * u64::from(attempt),
                                            ))
                                            .await;
                                        }
                                        Err(e) => {
                                            error!("signal dropped after retries: {}", e);
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => debug!("undecodable signal: {}", e),
                        }
                    }
                    warn!(%channel, "signal subscription ended, reconnecting");
                }
                Err(e) => {
                    error!(%channel, "signal subscribe failed: {}", e);
                }
            }
            health.set_redis_connected(false);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Consume cancel requests from the control channel.
    pub async fn run_cancel_consumer(&self, coordinator: Arc<ExecutionCoordinator>) {
        let channel = self.config.cancel_channel.clone();
        loop {
            if !coordinator.is_accepting() {
                break;
            }
            match self.subscribe(&channel).await {
                Ok(mut pubsub) => {
                    info!(%channel, "subscribed for cancel requests");
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                debug!("unreadable cancel payload: {}", e);
                                continue;
                            }
                        };
                        match serde_json::from_str::<CancelRequest>(&payload) {
                            Ok(req) => {
                                if let Err(e) = coordinator.cancel_order(
                                    &req.account_id,
                                    &req.symbol,
                                    req.order_id,
                                ) {
                                    warn!("cancel dropped: {}", e);
                                }
                            }
                            Err(e) => debug!("undecodable cancel: {}", e),
                        }
                    }
                    warn!(%channel, "cancel subscription ended, reconnecting");
                }
                Err(e) => {
                    error!(%channel, "cancel subscribe failed: {}", e);
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<redis::aio::PubSub> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }

    async fn publisher(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.publish_conn.read().await.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *self.publish_conn.write().await = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl EventSink for RedisBus {
    async fn publish(&self, event: &ExecutionEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.publisher().await?;
        let receivers: i64 = match conn.publish(&self.config.event_channel, payload).await {
            Ok(n) => n,
            Err(e) => {
                // Drop the cached connection so the retry reconnects
                *self.publish_conn.write().await = None;
                return Err(e.into());
            }
        };
        debug!(
            channel = %self.config.event_channel,
            receivers,
            event = event.event_type(),
            "event published"
        );
        Ok(())
    }
}
