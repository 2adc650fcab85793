use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub dedup: DedupConfig,
    pub transport: TransportConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health server port (default: 8080)
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Adverse price deviation applied to market-order fills, in basis points
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Fee charged on each fill as basis points of notional
    #[serde(default)]
    pub fee_bps: u32,
    /// Cash balance granted to an account on first sight
    #[serde(default = "default_starting_cash")]
    pub starting_cash: Decimal,
    /// Symbols the engine accepts orders for; empty accepts any symbol
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Cancel resting orders older than this many seconds; unset disables
    #[serde(default)]
    pub order_ttl_secs: Option<u64>,
    /// Interval of the TTL sweep in seconds
    #[serde(default = "default_ttl_sweep_interval")]
    pub ttl_sweep_interval_secs: u64,
}

fn default_slippage_bps() -> u32 {
    5
}

fn default_starting_cash() -> Decimal {
    Decimal::from(1_000_000)
}

fn default_ttl_sweep_interval() -> u64 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            fee_bps: 0,
            starting_cash: default_starting_cash(),
            symbols: Vec::new(),
            order_ttl_secs: None,
            ttl_sweep_interval_secs: default_ttl_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Seconds a signal id is remembered; redelivery beyond this window is
    /// assumed impossible. Bounded memory vs perfect idempotency trade-off.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_retention_secs() -> u64 {
    86_400 // 24h
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Channel carrying MarketTick messages
    #[serde(default = "default_tick_channel")]
    pub tick_channel: String,
    /// Channel carrying Signal messages
    #[serde(default = "default_signal_channel")]
    pub signal_channel: String,
    /// Channel carrying cancel requests
    #[serde(default = "default_cancel_channel")]
    pub cancel_channel: String,
    /// Channel execution events are published to
    #[serde(default = "default_event_channel")]
    pub event_channel: String,
}

fn default_cancel_channel() -> String {
    "order_cancels".to_string()
}

fn default_tick_channel() -> String {
    "market_data".to_string()
}

fn default_signal_channel() -> String {
    "trading_signals".to_string()
}

fn default_event_channel() -> String {
    "execution_events".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ALGEX_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ALGEX_TRANSPORT__REDIS_URL, etc.)
            .add_source(
                Environment::with_prefix("ALGEX")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config() -> Self {
        Self {
            engine: EngineConfig::default(),
            dedup: DedupConfig::default(),
            transport: TransportConfig {
                redis_url: "redis://127.0.0.1:6379".to_string(),
                tick_channel: default_tick_channel(),
                signal_channel: default_signal_channel(),
                cancel_channel: default_cancel_channel(),
                event_channel: default_event_channel(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/algex".to_string(),
                max_connections: 5,
            },
            logging: LoggingConfig::default(),
            health_port: Some(8080),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.slippage_bps >= 10_000 {
            errors.push("engine.slippage_bps must be below 10000".to_string());
        }

        if self.engine.fee_bps >= 10_000 {
            errors.push("engine.fee_bps must be below 10000".to_string());
        }

        if self.engine.starting_cash < Decimal::ZERO {
            errors.push("engine.starting_cash must not be negative".to_string());
        }

        if self.dedup.retention_secs == 0 {
            errors.push("dedup.retention_secs must be positive".to_string());
        }

        if let Some(ttl) = self.engine.order_ttl_secs {
            if ttl == 0 {
                errors.push("engine.order_ttl_secs must be positive when set".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
