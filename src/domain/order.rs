use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Sign of the side's effect on a position: +1 for BUY, -1 for SELL.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, not yet accepted into the book
    New,
    /// Order resting, eligible for matching
    Working,
    /// Order partially filled, remainder still working
    PartiallyFilled,
    /// Order fully filled
    Filled,
    /// Order canceled (externally or by TTL), fills so far preserved
    Canceled,
    /// Order rejected by validation
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Working | OrderStatus::PartiallyFilled
        )
    }

    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            // From New
            (New, Working) => true,
            (New, Rejected) => true, // Validation failure

            // From Working
            (Working, PartiallyFilled) => true,
            (Working, Filled) => true,
            (Working, Canceled) => true, // External or TTL cancel

            // From PartiallyFilled
            (PartiallyFilled, Working) => true, // Remainder keeps resting
            (PartiallyFilled, Filled) => true,
            (PartiallyFilled, Canceled) => true,

            // Filled, Canceled, Rejected are terminal
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Working => "WORKING",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempted transition on a terminal order, or an illegal edge in the
/// lifecycle graph. Logged and dropped by the coordinator, never retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("state conflict on order {order_id}: {from} -> {to}")]
pub struct StateConflict {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// A simulated order tracked by the engine.
///
/// Exactly one order exists per accepted signal; `signal_id` is the link
/// back to the originating signal. Orders are never deleted, only archived
/// once they reach a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub signal_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order from an accepted signal.
    pub fn from_signal(signal: &super::Signal) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            signal_id: signal.signal_id.clone(),
            account_id: signal.account_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            order_type: signal.order_type,
            quantity: signal.quantity,
            limit_price: signal.limit_price,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Quantity still open for matching. Filled quantity is never revisited.
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Transition to a new status, enforcing the lifecycle graph.
    pub fn transition(&mut self, target: OrderStatus) -> Result<(), StateConflict> {
        if !self.status.can_transition_to(target) {
            return Err(StateConflict {
                order_id: self.order_id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a fill: bump filled quantity, recompute the average fill price,
    /// and transition to PartiallyFilled or Filled. The fill must have been
    /// cut for at most this order's remaining quantity.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<(), StateConflict> {
        debug_assert_eq!(fill.order_id, self.order_id);

        let target = if self.filled_quantity + fill.quantity >= self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(target)?;

        let prior_notional = self
            .average_fill_price
            .map(|p| p * self.filled_quantity)
            .unwrap_or(Decimal::ZERO);
        self.filled_quantity += fill.quantity;
        self.average_fill_price =
            Some((prior_notional + fill.price * fill.quantity) / self.filled_quantity);
        Ok(())
    }
}

/// An immutable record that some quantity of an order executed at a price.
///
/// `tick_sequence_used` ties the fill to the market event that produced it,
/// which is what makes replay deterministic and auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: Uuid,
    pub order_id: Uuid,
    pub price: Decimal,
    pub quantity: Decimal,
    pub slippage_bps: u32,
    pub tick_sequence_used: u64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn new(
        order_id: Uuid,
        price: Decimal,
        quantity: Decimal,
        slippage_bps: u32,
        tick_sequence_used: u64,
    ) -> Self {
        Self {
            fill_id: Uuid::new_v4(),
            order_id,
            price,
            quantity,
            slippage_bps,
            tick_sequence_used,
            timestamp: Utc::now(),
        }
    }

    /// Notional value of the fill
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}
