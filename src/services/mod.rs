pub mod health;
pub mod metrics;

pub use health::{ComponentHealth, HealthServer, HealthState, HealthStatus};
pub use metrics::Metrics;
