pub mod coordinator;
pub mod dedup;
pub mod ledger;
pub mod matching;
pub mod partition;
pub mod snapshot;

pub use coordinator::ExecutionCoordinator;
pub use dedup::SignalDeduplicator;
pub use ledger::AccountLedger;
pub use matching::{FillDecision, Matcher};
pub use partition::{PartitionHandle, PartitionKey, PartitionMsg, PartitionSnapshot};
pub use snapshot::{MarketSnapshotStore, TickOutcome};
