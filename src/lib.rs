pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod services;
pub mod transport;

pub use config::AppConfig;
pub use engine::{ExecutionCoordinator, MarketSnapshotStore, SignalDeduplicator, TickOutcome};
pub use error::{AlgexError, Result};
pub use persistence::{EventPublisher, TradeStore};
pub use services::{HealthServer, HealthState, Metrics};
pub use transport::{EventSink, MemorySink, RedisBus};
