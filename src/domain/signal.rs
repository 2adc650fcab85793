use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderType, Side};

/// Direction of a signal as it appears on the wire.
///
/// Strategies also emit HOLD, which carries no order intent; the engine
/// drops it before dedup so it never consumes an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalDirection::Buy => Some(Side::Buy),
            SignalDirection::Sell => Some(Side::Sell),
            SignalDirection::Hold => None,
        }
    }
}

/// Signal message as decoded from the messaging boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "signalId")]
    pub signal_id: String,
    #[serde(rename = "accountId")]
    pub account_id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub direction: SignalDirection,
    #[serde(rename = "orderType", default = "default_order_type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(rename = "limitPrice", default)]
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

impl SignalMessage {
    /// Convert into an engine signal, stamping the receive time.
    /// Returns None for HOLD — no order intent to act on.
    pub fn into_signal(self) -> Option<Signal> {
        let side = self.direction.side()?;
        Some(Signal {
            signal_id: self.signal_id,
            account_id: self.account_id,
            symbol: self.symbol,
            side,
            order_type: self.order_type,
            quantity: self.quantity,
            limit_price: self.limit_price,
            received_at: Utc::now(),
        })
    }
}

/// An instruction from a strategy to buy or sell a quantity of a symbol.
///
/// `signal_id` is supplied by the originator and is the idempotency key:
/// at most one order is ever created per id, no matter how many times the
/// messaging layer redelivers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub received_at: DateTime<Utc>,
}

/// Why a signal was rejected at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    NonPositiveQuantity,
    MissingLimitPrice,
    UnknownSymbol,
    InsufficientCash,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NonPositiveQuantity => "NON_POSITIVE_QUANTITY",
            RejectReason::MissingLimitPrice => "MISSING_LIMIT_PRICE",
            RejectReason::UnknownSymbol => "UNKNOWN_SYMBOL",
            RejectReason::InsufficientCash => "INSUFFICIENT_CASH",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn hold_signals_carry_no_order_intent() {
        let msg = SignalMessage {
            signal_id: "s1".into(),
            account_id: "a1".into(),
            symbol: "BTCUSDT".into(),
            direction: SignalDirection::Hold,
            order_type: OrderType::Market,
            quantity: dec!(1),
            limit_price: None,
            timestamp: None,
        };
        assert!(msg.into_signal().is_none());
    }

    #[test]
    fn wire_format_round_trips() {
        let json = r#"{
            "signalId": "sig-42",
            "accountId": "acct-7",
            "symbol": "ETHUSDT",
            "type": "SELL",
            "orderType": "LIMIT",
            "quantity": "5",
            "limitPrice": "48000"
        }"#;
        let msg: SignalMessage = serde_json::from_str(json).unwrap();
        let signal = msg.into_signal().unwrap();
        assert_eq!(signal.side, Side::Sell);
        assert_eq!(signal.order_type, OrderType::Limit);
        assert_eq!(signal.limit_price, Some(dec!(48000)));
    }

    #[test]
    fn order_type_defaults_to_market() {
        let json = r#"{
            "signalId": "sig-1",
            "accountId": "acct-1",
            "symbol": "BTCUSDT",
            "type": "BUY",
            "quantity": "2"
        }"#;
        let msg: SignalMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.order_type, OrderType::Market);
    }
}
