use std::sync::Arc;

use algex::cli::{Cli, Commands};
use algex::config::AppConfig;
use algex::engine::ExecutionCoordinator;
use algex::error::Result;
use algex::persistence::{EventPublisher, TradeStore};
use algex::services::{HealthServer, HealthState, Metrics};
use algex::transport::{EventSink, RedisBus};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::CheckConfig => {
            init_logging_simple();
            check_config(&cli.config)
        }
        Commands::Run => run_engine(&cli.config).await,
    }
}

fn check_config(config_dir: &str) -> Result<()> {
    let config = AppConfig::load_from(config_dir)?;
    match config.validate() {
        Ok(()) => {
            println!("configuration ok");
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("config error: {e}");
            }
            Err(algex::AlgexError::Validation(errors.join("; ")))
        }
    }
}

async fn run_engine(config_dir: &str) -> Result<()> {
    // Load configuration
    let config = match AppConfig::load_from(config_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            info!("Using default configuration");
            AppConfig::default_config()
        }
    };
    init_logging(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config error: {e}");
        }
        return Err(algex::AlgexError::Validation(errors.join("; ")));
    }

    info!("Starting execution engine (algex)");
    info!(
        slippage_bps = config.engine.slippage_bps,
        fee_bps = config.engine.fee_bps,
        dedup_retention_secs = config.dedup.retention_secs,
        "engine configuration"
    );

    // Trade store is optional: the engine's own state is authoritative and
    // the hand-off is eventually consistent
    let store = match TradeStore::new(&config.database.url, config.database.max_connections).await {
        Ok(s) => {
            if let Err(e) = s.migrate().await {
                error!("Database migration failed: {}", e);
            }
            info!("Trade store connected");
            Some(Arc::new(s))
        }
        Err(e) => {
            error!("Database connection failed: {} - running without persistence", e);
            None
        }
    };

    // Messaging transport
    let bus = Arc::new(RedisBus::new(config.transport.clone())?);
    if let Err(e) = bus.ping().await {
        warn!("Redis not reachable yet: {} - consumers will retry", e);
    }

    // Core engine
    let metrics = Arc::new(Metrics::new());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let coordinator = Arc::new(ExecutionCoordinator::new(
        config.engine.clone(),
        &config.dedup,
        events_tx,
        Arc::clone(&metrics),
    ));

    // Warm the deduplicator from the durable event log so redelivery
    // across the restart stays idempotent within the retention window
    if let Some(store) = &store {
        let since =
            chrono::Utc::now() - chrono::Duration::seconds(config.dedup.retention_secs as i64);
        match store.recent_signal_ids(since).await {
            Ok(entries) => {
                let count = entries.len();
                coordinator.warm_dedup(entries);
                info!(count, "deduplicator warmed from trade store");
            }
            Err(e) => warn!("deduplicator warm-up failed: {}", e),
        }
    }

    // Event hand-off to the analytics boundary
    let sink: Option<Arc<dyn EventSink>> = Some(Arc::clone(&bus) as Arc<dyn EventSink>);
    let publisher = EventPublisher::new(store.clone(), sink, Arc::clone(&metrics));
    let publisher_handle = publisher.spawn(events_rx);

    // Health server
    let health_state = Arc::new(HealthState::new(Arc::clone(&coordinator)));
    health_state.set_db_connected(store.is_some());
    let health_port = config.health_port.unwrap_or(8080);
    let health_server = HealthServer::new(Arc::clone(&health_state), health_port);
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            error!("Health server failed: {}", e);
        }
    });

    // TTL sweep (if configured)
    let ttl_handle = Arc::clone(&coordinator).spawn_ttl_sweeper();

    // Inbound consumers
    let tick_handle = {
        let bus = Arc::clone(&bus);
        let coordinator = Arc::clone(&coordinator);
        let health = Arc::clone(&health_state);
        tokio::spawn(async move { bus.run_tick_consumer(coordinator, health).await })
    };
    let signal_handle = {
        let bus = Arc::clone(&bus);
        let coordinator = Arc::clone(&coordinator);
        let health = Arc::clone(&health_state);
        tokio::spawn(async move { bus.run_signal_consumer(coordinator, health).await })
    };
    let cancel_handle = {
        let bus = Arc::clone(&bus);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { bus.run_cancel_consumer(coordinator).await })
    };

    // Periodic status logging
    let status_handle = {
        let metrics = Arc::clone(&metrics);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                info!(
                    partitions = coordinator.partition_count(),
                    lag = coordinator.total_lag(),
                    "{}",
                    metrics.summary()
                );
            }
        })
    };

    info!("Execution engine running; press Ctrl+C to stop");
    shutdown_signal().await;
    info!("Shutdown requested");

    // Stop admission, let partitions drain, then stop the ancillary tasks
    coordinator.shutdown();
    tick_handle.abort();
    signal_handle.abort();
    cancel_handle.abort();
    status_handle.abort();
    if let Some(h) = ttl_handle {
        h.abort();
    }

    // The event channel closes once the coordinator's partitions are gone;
    // give the publisher a moment to flush
    let _ = tokio::time::timeout(tokio::time::Duration::from_secs(5), publisher_handle).await;
    health_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,algex={},sqlx=warn", config.logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
