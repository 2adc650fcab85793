//! Execution Coordinator
//!
//! The orchestration layer: signals and ticks come in from the messaging
//! boundary, run through dedup → validation → state machine → matching →
//! ledger in that order, and leave as execution events on the analytics
//! boundary. Work is partitioned by (account, symbol); unrelated pairs
//! proceed fully in parallel, one pair is strictly ordered by its
//! partition mailbox.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DedupConfig, EngineConfig};
use crate::domain::{
    Account, CancelReason, ExecutionEvent, MarketTick, Signal, SignalMessage,
};
use crate::engine::dedup::SignalDeduplicator;
use crate::engine::ledger::AccountLedger;
use crate::engine::matching::Matcher;
use crate::engine::partition::{
    self, PartitionHandle, PartitionKey, PartitionMsg, PartitionSnapshot,
};
use crate::engine::snapshot::{MarketSnapshotStore, TickOutcome};
use crate::error::{AlgexError, Result};
use crate::services::Metrics;

pub struct ExecutionCoordinator {
    config: EngineConfig,
    snapshot: Arc<MarketSnapshotStore>,
    dedup: Arc<SignalDeduplicator>,
    ledger: Arc<AccountLedger>,
    matcher: Matcher,
    partitions: DashMap<PartitionKey, PartitionHandle>,
    /// Tick fan-out index: symbol -> partitions trading it
    by_symbol: DashMap<String, Vec<PartitionKey>>,
    events_tx: mpsc::UnboundedSender<ExecutionEvent>,
    metrics: Arc<Metrics>,
    accepting: AtomicBool,
}

impl ExecutionCoordinator {
    pub fn new(
        config: EngineConfig,
        dedup_config: &DedupConfig,
        events_tx: mpsc::UnboundedSender<ExecutionEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let matcher = Matcher::new(config.slippage_bps);
        let ledger = Arc::new(AccountLedger::new(config.starting_cash, config.fee_bps));
        Self {
            config,
            snapshot: Arc::new(MarketSnapshotStore::new()),
            dedup: Arc::new(SignalDeduplicator::new(dedup_config.retention_secs)),
            ledger,
            matcher,
            partitions: DashMap::new(),
            by_symbol: DashMap::new(),
            events_tx,
            metrics,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn snapshot_store(&self) -> Arc<MarketSnapshotStore> {
        Arc::clone(&self.snapshot)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Current state of an account, if it has traded or reserved cash.
    pub fn account(&self, account_id: &str) -> Option<Account> {
        self.ledger.account(account_id)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Seed the deduplicator from durable storage after a restart. Signals
    /// whose effects were persisted stay deduped; signals lost with the
    /// in-memory book are replayed by redelivery, recreating their orders.
    pub fn warm_dedup<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, chrono::DateTime<chrono::Utc>)>,
    {
        self.dedup.preload(entries);
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Total messages admitted but not yet processed across partitions.
    pub fn total_lag(&self) -> i64 {
        self.partitions.iter().map(|p| p.value().lag()).sum()
    }

    // ==================== Inbound: signals ====================

    /// Entry point for the signal boundary: decodes order intent, drops
    /// HOLDs, then runs the idempotent signal path.
    pub fn handle_signal_message(&self, message: SignalMessage) -> Result<()> {
        self.metrics.inc_signals_received();
        match message.into_signal() {
            Some(signal) => self.handle_signal(signal),
            None => {
                self.metrics.inc_signals_hold();
                Ok(())
            }
        }
    }

    /// Dedup, then route to the (account, symbol) partition. A duplicate
    /// signal is an idempotent no-op, not an error.
    pub fn handle_signal(&self, signal: Signal) -> Result<()> {
        if !self.is_accepting() {
            return Err(AlgexError::Cancelled);
        }
        if !self.dedup.admit(&signal.signal_id) {
            debug!(signal_id = %signal.signal_id, "duplicate signal dropped");
            self.metrics.inc_signals_duplicate();
            return Ok(());
        }
        let signal_id = signal.signal_id.clone();
        let key = PartitionKey::new(&signal.account_id, &signal.symbol);
        self.route(key, PartitionMsg::Signal(signal)).map_err(|e| {
            // Give the idempotency key back so the transport's retry of
            // this delivery is not mistaken for a duplicate
            self.dedup.forget(&signal_id);
            e
        })
    }

    // ==================== Inbound: ticks ====================

    /// Apply a tick to the snapshot store and, if it was fresh, notify
    /// every partition on that symbol so resting orders re-evaluate. The
    /// fan-out runs inside the store's per-symbol critical section, which
    /// keeps notifications in sequence order even with concurrent ingest
    /// workers.
    pub fn handle_tick(&self, tick: MarketTick) -> Result<TickOutcome> {
        if tick.price <= Decimal::ZERO {
            return Err(AlgexError::InvalidMarketData(format!(
                "non-positive price {} for {}",
                tick.price, tick.symbol
            )));
        }

        let outcome = self.snapshot.apply_tick_then(&tick, |previous| {
            // Copy the key list out before touching the partition map so
            // the two maps are never locked at the same time
            let keys: Vec<PartitionKey> = self
                .by_symbol
                .get(&tick.symbol)
                .map(|keys| keys.clone())
                .unwrap_or_default();
            for key in keys {
                if let Some(handle) = self.partitions.get(&key) {
                    let msg = PartitionMsg::Tick {
                        price: tick.price,
                        previous,
                        sequence: tick.sequence,
                    };
                    if handle.send(msg).is_err() {
                        warn!(partition = %key, "tick fan-out to stopped partition");
                    }
                }
            }
        });

        match outcome {
            TickOutcome::Applied { .. } => self.metrics.inc_ticks_applied(),
            TickOutcome::Stale => self.metrics.inc_ticks_stale(),
        }
        Ok(outcome)
    }

    // ==================== Control ====================

    /// Cancel a working order. The cancel is admitted into the same
    /// mailbox as ticks for the pair, so a cancel that gets in first wins
    /// the race with any later qualifying tick.
    pub fn cancel_order(&self, account_id: &str, symbol: &str, order_id: Uuid) -> Result<()> {
        let key = PartitionKey::new(account_id, symbol);
        self.route(
            key,
            PartitionMsg::Cancel {
                order_id,
                reason: CancelReason::External,
            },
        )
    }

    /// Spawn the TTL sweep task, if an order TTL is configured. Cancels
    /// ride the normal partition path so they obey pair ordering.
    pub fn spawn_ttl_sweeper(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let ttl_secs = self.config.order_ttl_secs?;
        let interval_secs = self.config.ttl_sweep_interval_secs.max(1);
        let coordinator = self;
        info!(ttl_secs, interval_secs, "order TTL sweeper enabled");

        Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                if !coordinator.is_accepting() {
                    break;
                }
                let cutoff = chrono::Utc::now() - chrono::Duration::seconds(ttl_secs as i64);
                for entry in coordinator.partitions.iter() {
                    if entry.value().send(PartitionMsg::SweepTtl { cutoff }).is_err() {
                        debug!(partition = %entry.key(), "TTL sweep to stopped partition");
                    }
                }
            }
        }))
    }

    /// Stop accepting new work and close all partition mailboxes. Already
    /// admitted messages drain before the partition tasks exit.
    pub fn shutdown(&self) {
        info!("coordinator shutting down");
        self.accepting.store(false, Ordering::SeqCst);
        self.by_symbol.clear();
        self.partitions.clear();
    }

    // ==================== Inspection ====================

    /// Serialized snapshot of one pair's orders and position.
    pub async fn inspect_pair(
        &self,
        account_id: &str,
        symbol: &str,
    ) -> Option<PartitionSnapshot> {
        let key = PartitionKey::new(account_id, symbol);
        let handle = self.partitions.get(&key)?.clone();
        let (reply, rx) = oneshot::channel();
        handle.send(PartitionMsg::Inspect { reply }).ok()?;
        rx.await.ok()
    }

    // ==================== Internals ====================

    fn route(&self, key: PartitionKey, msg: PartitionMsg) -> Result<()> {
        let handle = self
            .partitions
            .entry(key.clone())
            .or_insert_with(|| {
                self.by_symbol
                    .entry(key.symbol.clone())
                    .or_default()
                    .push(key.clone());
                let symbol_allowed = self.config.symbols.is_empty()
                    || self.config.symbols.iter().any(|s| s == &key.symbol);
                partition::spawn(
                    key.clone(),
                    symbol_allowed,
                    Arc::clone(&self.snapshot),
                    Arc::clone(&self.ledger),
                    self.matcher,
                    self.events_tx.clone(),
                    Arc::clone(&self.metrics),
                )
            })
            .clone();

        handle.send(msg).map_err(|_| AlgexError::PartitionUnavailable {
            account_id: key.account_id,
            symbol: key.symbol,
            reason: "partition mailbox closed".to_string(),
        })
    }
}
