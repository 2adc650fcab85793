use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for observability
#[derive(Default)]
pub struct Metrics {
    /// Ticks applied to the snapshot store
    pub ticks_applied: AtomicU64,
    /// Ticks discarded by the monotonic sequence guard
    pub ticks_stale: AtomicU64,
    /// Signals received from the messaging boundary
    pub signals_received: AtomicU64,
    /// Signals dropped as duplicates
    pub signals_duplicate: AtomicU64,
    /// HOLD signals dropped without order intent
    pub signals_hold: AtomicU64,
    /// Orders accepted into the book
    pub orders_created: AtomicU64,
    /// Orders fully filled
    pub orders_filled: AtomicU64,
    /// Orders rejected at validation
    pub orders_rejected: AtomicU64,
    /// Orders canceled (external, TTL, or fill-time cash check)
    pub orders_canceled: AtomicU64,
    /// Individual fills committed
    pub fills: AtomicU64,
    /// Execution events durably handed off
    pub events_published: AtomicU64,
    /// Hand-off attempts that exhausted their retries
    pub event_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_ticks_applied(&self) {
        self.ticks_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ticks_stale(&self) {
        self.ticks_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signals_received(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signals_duplicate(&self) {
        self.signals_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signals_hold(&self) {
        self.signals_hold.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_created(&self) {
        self.orders_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_filled(&self) {
        self.orders_filled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_canceled(&self) {
        self.orders_canceled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fills(&self) {
        self.fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_event_failures(&self) {
        self.event_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format. Partition count and mailbox
    /// lag are supplied by the caller, which can see the coordinator.
    pub fn prometheus(&self, partitions: usize, mailbox_lag: i64) -> String {
        format!(
            r#"# HELP algex_ticks_applied_total Ticks applied to the snapshot store
# TYPE algex_ticks_applied_total counter
algex_ticks_applied_total {}

# HELP algex_ticks_stale_total Ticks discarded by the sequence guard
# TYPE algex_ticks_stale_total counter
algex_ticks_stale_total {}

# HELP algex_signals_received_total Signals received
# TYPE algex_signals_received_total counter
algex_signals_received_total {}

# HELP algex_signals_duplicate_total Duplicate signals dropped
# TYPE algex_signals_duplicate_total counter
algex_signals_duplicate_total {}

# HELP algex_orders_created_total Orders accepted
# TYPE algex_orders_created_total counter
algex_orders_created_total {}

# HELP algex_orders_filled_total Orders fully filled
# TYPE algex_orders_filled_total counter
algex_orders_filled_total {}

# HELP algex_orders_rejected_total Orders rejected at validation
# TYPE algex_orders_rejected_total counter
algex_orders_rejected_total {}

# HELP algex_orders_canceled_total Orders canceled
# TYPE algex_orders_canceled_total counter
algex_orders_canceled_total {}

# HELP algex_fills_total Fills committed
# TYPE algex_fills_total counter
algex_fills_total {}

# HELP algex_events_published_total Execution events handed off
# TYPE algex_events_published_total counter
algex_events_published_total {}

# HELP algex_event_failures_total Event hand-offs that exhausted retries
# TYPE algex_event_failures_total counter
algex_event_failures_total {}

# HELP algex_partitions Active (account, symbol) partitions
# TYPE algex_partitions gauge
algex_partitions {}

# HELP algex_partition_lag Messages admitted but not yet processed
# TYPE algex_partition_lag gauge
algex_partition_lag {}
"#,
            self.ticks_applied.load(Ordering::Relaxed),
            self.ticks_stale.load(Ordering::Relaxed),
            self.signals_received.load(Ordering::Relaxed),
            self.signals_duplicate.load(Ordering::Relaxed),
            self.orders_created.load(Ordering::Relaxed),
            self.orders_filled.load(Ordering::Relaxed),
            self.orders_rejected.load(Ordering::Relaxed),
            self.orders_canceled.load(Ordering::Relaxed),
            self.fills.load(Ordering::Relaxed),
            self.events_published.load(Ordering::Relaxed),
            self.event_failures.load(Ordering::Relaxed),
            partitions,
            mailbox_lag,
        )
    }

    /// One-line status for periodic logging
    pub fn summary(&self) -> String {
        format!(
            "ticks={}/{} stale, signals={} ({} dup), orders={} created / {} filled / {} rejected / {} canceled, fills={}",
            self.ticks_applied.load(Ordering::Relaxed),
            self.ticks_stale.load(Ordering::Relaxed),
            self.signals_received.load(Ordering::Relaxed),
            self.signals_duplicate.load(Ordering::Relaxed),
            self.orders_created.load(Ordering::Relaxed),
            self.orders_filled.load(Ordering::Relaxed),
            self.orders_rejected.load(Ordering::Relaxed),
            self.orders_canceled.load(Ordering::Relaxed),
            self.fills.load(Ordering::Relaxed),
        )
    }
}
