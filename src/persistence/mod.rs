pub mod publisher;
pub mod trade_store;

pub use publisher::EventPublisher;
pub use trade_store::{StoredExecutionEvent, TradeStore};
