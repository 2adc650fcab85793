use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price update for a symbol from the market data source.
///
/// `sequence` is monotonic per symbol and is the staleness guard: a tick
/// whose sequence is not strictly greater than the last applied one is
/// discarded, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub price: Decimal,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

impl MarketTick {
    pub fn new(symbol: impl Into<String>, price: Decimal, sequence: u64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
            sequence,
        }
    }
}

/// Latest applied price for a symbol in the snapshot store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}
