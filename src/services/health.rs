//! Health check HTTP server for production monitoring
//!
//! Liveness and readiness probes for process supervision plus a Prometheus
//! metrics endpoint. Operational surface only — no business semantics.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::engine::ExecutionCoordinator;
use crate::error::AlgexError;

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

/// Overall system health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub accepting_work: bool,
    pub partitions: usize,
    pub partition_lag: i64,
    pub components: Vec<ComponentHealth>,
}

/// Shared state for the health server
pub struct HealthState {
    /// When the server started
    pub started_at: DateTime<Utc>,
    /// Is the Redis transport connected
    pub redis_connected: AtomicBool,
    /// Last tick received over the transport
    pub last_tick: RwLock<Option<DateTime<Utc>>>,
    /// Is the trade store connected
    pub db_connected: AtomicBool,
    /// The coordinator, for partition counts and lag
    coordinator: Arc<ExecutionCoordinator>,
    /// Tick staleness threshold in seconds
    pub tick_staleness_threshold: u64,
}

impl HealthState {
    pub fn new(coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self {
            started_at: Utc::now(),
            redis_connected: AtomicBool::new(false),
            last_tick: RwLock::new(None),
            db_connected: AtomicBool::new(false),
            coordinator,
            tick_staleness_threshold: 30,
        }
    }

    pub fn set_redis_connected(&self, connected: bool) {
        self.redis_connected.store(connected, Ordering::SeqCst);
    }

    /// Record a tick received over the transport
    pub async fn record_tick(&self) {
        *self.last_tick.write().await = Some(Utc::now());
        self.redis_connected.store(true, Ordering::SeqCst);
    }

    pub fn set_db_connected(&self, connected: bool) {
        self.db_connected.store(connected, Ordering::SeqCst);
    }

    /// No tick within the staleness threshold?
    pub async fn is_feed_stale(&self) -> bool {
        if let Some(last) = *self.last_tick.read().await {
            let elapsed = (Utc::now() - last).num_seconds() as u64;
            elapsed > self.tick_staleness_threshold
        } else {
            true // No ticks received yet
        }
    }

    /// Get overall health status
    pub async fn get_health(&self) -> HealthResponse {
        let mut components = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        // Transport health
        let redis_connected = self.redis_connected.load(Ordering::SeqCst);
        let feed_stale = self.is_feed_stale().await;
        let transport_status = if redis_connected && !feed_stale {
            HealthStatus::Healthy
        } else if redis_connected && feed_stale {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
        if transport_status != HealthStatus::Healthy {
            overall_status = transport_status;
        }
        components.push(ComponentHealth {
            name: "transport".to_string(),
            status: transport_status,
            message: if feed_stale {
                Some("Tick feed is stale".to_string())
            } else if !redis_connected {
                Some("Disconnected".to_string())
            } else {
                None
            },
            last_check: *self.last_tick.read().await,
        });

        // Trade store health
        let db_connected = self.db_connected.load(Ordering::SeqCst);
        let db_status = if db_connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        if db_status == HealthStatus::Unhealthy && overall_status == HealthStatus::Healthy {
            overall_status = HealthStatus::Degraded; // Store can be optional
        }
        components.push(ComponentHealth {
            name: "trade_store".to_string(),
            status: db_status,
            message: if !db_connected {
                Some("Disconnected".to_string())
            } else {
                None
            },
            last_check: None,
        });

        // Engine admission
        let accepting = self.coordinator.is_accepting();
        if !accepting {
            overall_status = HealthStatus::Unhealthy;
        }
        components.push(ComponentHealth {
            name: "coordinator".to_string(),
            status: if accepting {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!accepting).then(|| "Not accepting work".to_string()),
            last_check: Some(Utc::now()),
        });

        let uptime = (Utc::now() - self.started_at).num_seconds() as u64;
        HealthResponse {
            status: overall_status,
            timestamp: Utc::now(),
            uptime_seconds: uptime,
            accepting_work: accepting,
            partitions: self.coordinator.partition_count(),
            partition_lag: self.coordinator.total_lag(),
            components,
        }
    }
}

/// Health check server
pub struct HealthServer {
    state: Arc<HealthState>,
    port: u16,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the health server
    pub async fn run(&self) -> crate::error::Result<()> {
        let state = Arc::clone(&self.state);

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting health server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| AlgexError::Internal(format!("Health server error: {}", e)))?;

        Ok(())
    }

    /// Get shared state for updating from other components
    pub fn state(&self) -> Arc<HealthState> {
        Arc::clone(&self.state)
    }
}

/// Full health check endpoint
async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.get_health().await;
    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // Still return 200 for degraded
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Liveness probe - is the process alive?
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe - is the engine accepting work?
async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.coordinator.is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let metrics = state.coordinator.metrics();
    let body = metrics.prometheus(
        state.coordinator.partition_count(),
        state.coordinator.total_lag(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        body,
    )
}
