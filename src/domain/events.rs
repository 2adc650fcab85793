use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Fill, OrderStatus, RejectReason, Side};

/// Why an order left the book without (fully) filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Cancel requested through the control boundary
    External,
    /// Order outlived its configured time-to-live
    Ttl,
    /// Cash check failed at fill time (market order admitted before a
    /// price existed for the symbol)
    InsufficientCash,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::External => "EXTERNAL",
            CancelReason::Ttl => "TTL",
            CancelReason::InsufficientCash => "INSUFFICIENT_CASH",
        }
    }
}

/// Record emitted to the analytics boundary after each committed state
/// change. Events are immutable facts; the downstream store appends them
/// at-least-once and the engine's own state never rolls back for a failed
/// hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionEvent {
    Filled {
        account_id: String,
        symbol: String,
        side: Side,
        order_id: Uuid,
        signal_id: String,
        fill: Fill,
        order_status: OrderStatus,
        filled_quantity: Decimal,
        realized_pnl: Decimal,
    },
    Rejected {
        account_id: String,
        symbol: String,
        order_id: Uuid,
        signal_id: String,
        reason: RejectReason,
    },
    Canceled {
        account_id: String,
        symbol: String,
        order_id: Uuid,
        signal_id: String,
        filled_quantity: Decimal,
        reason: CancelReason,
    },
}

impl ExecutionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::Filled { .. } => "FILLED",
            ExecutionEvent::Rejected { .. } => "REJECTED",
            ExecutionEvent::Canceled { .. } => "CANCELED",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            ExecutionEvent::Filled { order_id, .. }
            | ExecutionEvent::Rejected { order_id, .. }
            | ExecutionEvent::Canceled { order_id, .. } => *order_id,
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            ExecutionEvent::Filled { account_id, .. }
            | ExecutionEvent::Rejected { account_id, .. }
            | ExecutionEvent::Canceled { account_id, .. } => account_id,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            ExecutionEvent::Filled { symbol, .. }
            | ExecutionEvent::Rejected { symbol, .. }
            | ExecutionEvent::Canceled { symbol, .. } => symbol,
        }
    }

    pub fn signal_id(&self) -> &str {
        match self {
            ExecutionEvent::Filled { signal_id, .. }
            | ExecutionEvent::Rejected { signal_id, .. }
            | ExecutionEvent::Canceled { signal_id, .. } => signal_id,
        }
    }

    /// The fill this event carries, if it is a fill event.
    pub fn fill_id(&self) -> Option<Uuid> {
        match self {
            ExecutionEvent::Filled { fill, .. } => Some(fill.fill_id),
            _ => None,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExecutionEvent::Filled { fill, .. } => fill.timestamp,
            // Rejections and cancels are stamped at emission
            _ => Utc::now(),
        }
    }
}
