pub mod account;
pub mod events;
pub mod market;
pub mod order;
pub mod signal;

pub use account::{Account, Position};
pub use events::{CancelReason, ExecutionEvent};
pub use market::{MarketTick, Quote};
pub use order::{Fill, Order, OrderStatus, OrderType, Side, StateConflict};
pub use signal::{RejectReason, Signal, SignalDirection, SignalMessage};
