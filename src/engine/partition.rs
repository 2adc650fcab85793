//! Partition actor
//!
//! The unit of serialized state ownership, keyed by (account, symbol).
//! Each partition is a single-writer tokio task draining an ordered
//! mailbox; everything that reads or mutates this pair's orders or
//! position happens inside that task, so a cancel admitted before a tick
//! always commits before the tick's re-evaluation — the cancel/fill race
//! is decided by mailbox order, never by timestamp comparison.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    CancelReason, ExecutionEvent, Fill, Order, OrderStatus, OrderType, Position, RejectReason,
    Signal, Side,
};
use crate::engine::ledger::AccountLedger;
use crate::engine::matching::{FillDecision, Matcher};
use crate::engine::snapshot::MarketSnapshotStore;
use crate::services::Metrics;

/// Identity of one serialization unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub account_id: String,
    pub symbol: String,
}

impl PartitionKey {
    pub fn new(account_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account_id, self.symbol)
    }
}

/// Messages a partition processes, in strict mailbox order.
#[derive(Debug)]
pub enum PartitionMsg {
    Signal(Signal),
    Tick {
        price: Decimal,
        previous: Option<Decimal>,
        sequence: u64,
    },
    Cancel {
        order_id: Uuid,
        reason: CancelReason,
    },
    SweepTtl {
        cutoff: DateTime<Utc>,
    },
    Inspect {
        reply: oneshot::Sender<PartitionSnapshot>,
    },
}

/// Point-in-time copy of a partition's state, for inspection and tests.
#[derive(Debug, Clone)]
pub struct PartitionSnapshot {
    pub orders: Vec<Order>,
    pub position: Position,
    pub resting: usize,
}

impl PartitionSnapshot {
    pub fn order_for_signal(&self, signal_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.signal_id == signal_id)
    }
}

/// Sending side of a partition's mailbox, with queue-depth tracking for
/// the operational lag surface.
#[derive(Clone)]
pub struct PartitionHandle {
    tx: mpsc::UnboundedSender<PartitionMsg>,
    depth: Arc<AtomicI64>,
}

impl PartitionHandle {
    /// Admit a message into the mailbox. Fails only when the partition
    /// task has stopped (engine shutdown); the caller requeues, never
    /// processes out of order.
    pub fn send(&self, msg: PartitionMsg) -> Result<(), PartitionMsg> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.tx.send(msg).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            e.0
        })
    }

    /// Messages admitted but not yet processed.
    pub fn lag(&self) -> i64 {
        self.depth.load(Ordering::Relaxed).max(0)
    }
}

/// Spawn the single-writer task for a partition and return its handle.
pub fn spawn(
    key: PartitionKey,
    symbol_allowed: bool,
    snapshot: Arc<MarketSnapshotStore>,
    ledger: Arc<AccountLedger>,
    matcher: Matcher,
    events: mpsc::UnboundedSender<ExecutionEvent>,
    metrics: Arc<Metrics>,
) -> PartitionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicI64::new(0));

    let position = Position::new(key.account_id.clone(), key.symbol.clone());
    let worker = Partition {
        key,
        symbol_allowed,
        orders: HashMap::new(),
        resting: Vec::new(),
        reservations: HashMap::new(),
        position,
        snapshot,
        ledger,
        matcher,
        events,
        metrics,
    };
    tokio::spawn(worker.run(rx, Arc::clone(&depth)));

    PartitionHandle { tx, depth }
}

struct Partition {
    key: PartitionKey,
    symbol_allowed: bool,
    /// Every order ever routed here, terminal ones included (archived,
    /// never deleted)
    orders: HashMap<Uuid, Order>,
    /// Non-terminal orders in admission order
    resting: Vec<Uuid>,
    /// Outstanding reserved notional per LIMIT BUY order
    reservations: HashMap<Uuid, Decimal>,
    position: Position,
    snapshot: Arc<MarketSnapshotStore>,
    ledger: Arc<AccountLedger>,
    matcher: Matcher,
    events: mpsc::UnboundedSender<ExecutionEvent>,
    metrics: Arc<Metrics>,
}

impl Partition {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PartitionMsg>, depth: Arc<AtomicI64>) {
        debug!(partition = %self.key, "partition started");
        while let Some(msg) = rx.recv().await {
            depth.fetch_sub(1, Ordering::Relaxed);
            match msg {
                PartitionMsg::Signal(signal) => self.handle_signal(signal),
                PartitionMsg::Tick {
                    price,
                    previous,
                    sequence,
                } => self.handle_tick(price, previous, sequence),
                PartitionMsg::Cancel { order_id, reason } => self.handle_cancel(order_id, reason),
                PartitionMsg::SweepTtl { cutoff } => self.sweep_ttl(cutoff),
                PartitionMsg::Inspect { reply } => {
                    let _ = reply.send(self.snapshot_state());
                }
            }
        }
        debug!(partition = %self.key, "partition stopped");
    }

    fn snapshot_state(&self) -> PartitionSnapshot {
        PartitionSnapshot {
            orders: self.orders.values().cloned().collect(),
            position: self.position.clone(),
            resting: self.resting.len(),
        }
    }

    // ==================== Signals ====================

    fn handle_signal(&mut self, signal: Signal) {
        let mut order = Order::from_signal(&signal);

        if let Some(reason) = self.validate(&signal) {
            self.reject(order, reason);
            return;
        }

        // Commit reserved cash for resting LIMIT BUYs before accepting
        if order.order_type == OrderType::Limit && order.side == Side::Buy {
            if let Some(limit) = order.limit_price {
                let notional = limit * order.quantity;
                if !self.ledger.try_reserve(&order.account_id, notional) {
                    self.reject(order, RejectReason::InsufficientCash);
                    return;
                }
                self.reservations.insert(order.order_id, notional);
            }
        }

        let quote = self.snapshot.current(&self.key.symbol);

        // A market buy with a known price must be affordable up front; with
        // no price yet there is nothing to estimate against and the check
        // moves to fill time
        if order.order_type == OrderType::Market && order.side == Side::Buy {
            if let Some(quote) = quote {
                let est = self.matcher.market_fill_price(quote.price, Side::Buy) * order.quantity;
                if !self
                    .ledger
                    .can_spend(&order.account_id, est + self.ledger.fee(est))
                {
                    self.reject(order, RejectReason::InsufficientCash);
                    return;
                }
            }
        }

        if let Err(conflict) = order.transition(OrderStatus::Working) {
            warn!(%conflict, "dropping signal on illegal admission");
            return;
        }
        let order_id = order.order_id;
        let order_type = order.order_type;
        info!(
            partition = %self.key,
            %order_id,
            signal_id = %order.signal_id,
            side = %order.side,
            "order accepted"
        );
        self.metrics.inc_orders_created();
        self.orders.insert(order_id, order);
        self.resting.push(order_id);

        // Market orders are evaluated immediately on entering Working;
        // limit orders rest until a qualifying tick
        if order_type == OrderType::Market {
            if let Some(quote) = quote {
                let decision = self
                    .orders
                    .get(&order_id)
                    .and_then(|o| self.matcher.evaluate(o, quote.price, None));
                if let Some(decision) = decision {
                    self.commit_fill(order_id, decision, quote.sequence);
                }
            }
        }
    }

    fn validate(&self, signal: &Signal) -> Option<RejectReason> {
        if signal.quantity <= Decimal::ZERO {
            return Some(RejectReason::NonPositiveQuantity);
        }
        if signal.order_type == OrderType::Limit {
            match signal.limit_price {
                Some(limit) if limit > Decimal::ZERO => {}
                _ => return Some(RejectReason::MissingLimitPrice),
            }
        }
        if !self.symbol_allowed {
            return Some(RejectReason::UnknownSymbol);
        }
        None
    }

    fn reject(&mut self, mut order: Order, reason: RejectReason) {
        if let Err(conflict) = order.transition(OrderStatus::Rejected) {
            warn!(%conflict, "reject of non-new order dropped");
            return;
        }
        info!(
            partition = %self.key,
            order_id = %order.order_id,
            signal_id = %order.signal_id,
            %reason,
            "order rejected"
        );
        self.metrics.inc_orders_rejected();
        let event = ExecutionEvent::Rejected {
            account_id: order.account_id.clone(),
            symbol: order.symbol.clone(),
            order_id: order.order_id,
            signal_id: order.signal_id.clone(),
            reason,
        };
        self.orders.insert(order.order_id, order);
        self.emit(event);
    }

    // ==================== Ticks ====================

    fn handle_tick(&mut self, price: Decimal, previous: Option<Decimal>, sequence: u64) {
        if self.resting.is_empty() {
            return;
        }
        // Evaluate in admission order; commit_fill edits self.resting
        let candidates: Vec<Uuid> = self.resting.clone();
        for order_id in candidates {
            let decision = self
                .orders
                .get(&order_id)
                .and_then(|o| self.matcher.evaluate(o, price, previous));
            if let Some(decision) = decision {
                self.commit_fill(order_id, decision, sequence);
            }
        }
    }

    /// Apply one fill as a single atomic unit: cash guard, order state,
    /// position, account — all inside this partition's serialized section.
    fn commit_fill(&mut self, order_id: Uuid, decision: FillDecision, sequence: u64) {
        let (side, order_type, account_id) = match self.orders.get(&order_id) {
            Some(order) => (order.side, order.order_type, order.account_id.clone()),
            None => {
                warn!(partition = %self.key, %order_id, "fill for unknown order dropped");
                return;
            }
        };

        let fill = Fill::new(
            order_id,
            decision.price,
            decision.quantity,
            decision.slippage_bps,
            sequence,
        );
        let notional = fill.notional();

        // Market buys admitted before the symbol had a price carry no
        // reservation; if the cash is gone by the time the first tick
        // arrives the order leaves the book instead of overdrawing
        if side == Side::Buy && order_type == OrderType::Market {
            let cost = notional + self.ledger.fee(notional);
            if !self.ledger.can_spend(&account_id, cost) {
                warn!(
                    partition = %self.key,
                    %order_id,
                    "insufficient cash at fill time, canceling"
                );
                self.cancel_internal(order_id, CancelReason::InsufficientCash);
                return;
            }
        }

        // Order state first: a conflicting fill must leave position and
        // cash untouched
        let (symbol, signal_id, order_status, filled_quantity) =
            match self.orders.get_mut(&order_id) {
                Some(order) => {
                    if let Err(conflict) = order.apply_fill(&fill) {
                        warn!(%conflict, "fill on terminal order dropped");
                        return;
                    }
                    (
                        order.symbol.clone(),
                        order.signal_id.clone(),
                        order.status,
                        order.filled_quantity,
                    )
                }
                None => return,
            };

        let release = self
            .reservations
            .remove(&order_id)
            .unwrap_or(Decimal::ZERO);
        let realized = self.position.apply_fill(side, fill.quantity, fill.price);
        let account = self.ledger.settle_fill(&account_id, side, notional, release);

        let event = ExecutionEvent::Filled {
            account_id: account_id.clone(),
            symbol,
            side,
            order_id,
            signal_id,
            fill: fill.clone(),
            order_status,
            filled_quantity,
            realized_pnl: realized,
        };
        if account.cash_balance < Decimal::ZERO {
            debug!(
                partition = %self.key,
                %account_id,
                balance = %account.cash_balance,
                "cash balance below zero after crossing fill"
            );
        }

        info!(
            partition = %self.key,
            %order_id,
            fill_id = %fill.fill_id,
            price = %fill.price,
            quantity = %fill.quantity,
            tick_sequence = fill.tick_sequence_used,
            status = %order_status,
            "fill committed"
        );
        self.metrics.inc_fills();
        if order_status == OrderStatus::Filled {
            self.metrics.inc_orders_filled();
        }
        if order_status.is_terminal() {
            self.resting.retain(|id| *id != order_id);
        }
        self.emit(event);
    }

    // ==================== Cancels ====================

    fn handle_cancel(&mut self, order_id: Uuid, reason: CancelReason) {
        if !self.orders.contains_key(&order_id) {
            warn!(partition = %self.key, %order_id, "cancel for unknown order dropped");
            return;
        }
        self.cancel_internal(order_id, reason);
    }

    fn cancel_internal(&mut self, order_id: Uuid, reason: CancelReason) {
        let event = match self.orders.get_mut(&order_id) {
            Some(order) => {
                if let Err(conflict) = order.transition(OrderStatus::Canceled) {
                    // Late cancel after a fill: upstream and downstream are
                    // out of sync. Worth monitoring, not fatal.
                    warn!(%conflict, "state conflict, cancel dropped");
                    return;
                }
                ExecutionEvent::Canceled {
                    account_id: order.account_id.clone(),
                    symbol: order.symbol.clone(),
                    order_id,
                    signal_id: order.signal_id.clone(),
                    filled_quantity: order.filled_quantity,
                    reason,
                }
            }
            None => return,
        };

        if let Some(reserved) = self.reservations.remove(&order_id) {
            self.ledger.release(&self.key.account_id, reserved);
        }
        self.resting.retain(|id| *id != order_id);
        info!(
            partition = %self.key,
            %order_id,
            reason = reason.as_str(),
            "order canceled"
        );
        self.metrics.inc_orders_canceled();
        self.emit(event);
    }

    fn sweep_ttl(&mut self, cutoff: DateTime<Utc>) {
        let expired: Vec<Uuid> = self
            .resting
            .iter()
            .filter(|id| {
                self.orders
                    .get(id)
                    .map(|o| o.created_at < cutoff)
                    .unwrap_or(false)
            })
            .copied()
            .collect();
        for order_id in expired {
            self.cancel_internal(order_id, CancelReason::Ttl);
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if self.events.send(event).is_err() {
            // Publisher gone during shutdown; authoritative state is
            // already committed
            debug!(partition = %self.key, "event channel closed, emission dropped");
        }
    }
}
