//! Market Snapshot Store
//!
//! Holds the latest applied price and sequence number per symbol. This is
//! the only state mutated outside partition ownership; writes are
//! last-writer-wins per symbol behind the monotonic sequence guard, and
//! reads are safe from any partition.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::domain::{MarketTick, Quote};

/// Result of applying a tick to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick accepted; carries the previously stored price, if any, for
    /// limit-cross detection downstream.
    Applied { previous: Option<Decimal> },
    /// Sequence not strictly greater than the stored one. Discarded, not
    /// an error.
    Stale,
}

#[derive(Default)]
pub struct MarketSnapshotStore {
    quotes: DashMap<String, Quote>,
}

impl MarketSnapshotStore {
    pub fn new() -> Self {
        Self {
            quotes: DashMap::new(),
        }
    }

    /// Apply a tick, invoking `on_applied` with the previous price while
    /// the per-symbol entry is still held. Running the coordinator's
    /// fan-out inside that window is what keeps tick notifications for one
    /// symbol in sequence order even with concurrent ingest workers.
    pub fn apply_tick_then<F>(&self, tick: &MarketTick, on_applied: F) -> TickOutcome
    where
        F: FnOnce(Option<Decimal>),
    {
        let quote = Quote {
            price: tick.price,
            sequence: tick.sequence,
            timestamp: tick.timestamp,
        };

        match self.quotes.entry(tick.symbol.clone()) {
            Entry::Occupied(mut entry) => {
                if tick.sequence <= entry.get().sequence {
                    return TickOutcome::Stale;
                }
                let previous = Some(entry.get().price);
                entry.insert(quote);
                on_applied(previous);
                TickOutcome::Applied { previous }
            }
            Entry::Vacant(entry) => {
                entry.insert(quote);
                on_applied(None);
                TickOutcome::Applied { previous: None }
            }
        }
    }

    /// Apply a tick without a notification hook.
    pub fn apply_tick(&self, tick: &MarketTick) -> TickOutcome {
        self.apply_tick_then(tick, |_| {})
    }

    /// Latest applied quote for a symbol, or None if it has never ticked.
    pub fn current(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol).map(|q| *q)
    }

    /// Latest applied price for a symbol.
    pub fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.current(symbol).map(|q| q.price)
    }

    pub fn symbol_count(&self) -> usize {
        self.quotes.len()
    }
}
