//! Automation Engine Service
//!
//! Wires the rule engine to its sinks and exposes a read-only status API:
//! - `GET /api/v1/health`: liveness, uptime, rule and dispatch counts
//! - `GET /api/v1/rules`: rule summaries with active/total counts
//! - `GET /metrics`: Prometheus exposition

use axum::{routing::get, Router};
use dispatcher::EngineStats;
use metrics_exporter_prometheus::PrometheusHandle;
use rule_engine::LifecycleManager;
use sinks::SqliteAlertSink;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod routes;
mod settings;
mod shutdown;

pub use settings::{
    AlertsConfig, LoggingConfig, RulesConfig, ServerConfig, ServiceConfig, DEFAULT_CONFIG_FILE,
};
pub use shutdown::wait_for_shutdown;

/// Service setup errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid log level: {0}")]
    LogLevel(String),

    #[error("Logging already initialized: {0}")]
    Logging(String),
}

/// Application state shared across handlers
pub struct AppState {
    /// Rule lifecycle, store, and cooldowns
    pub lifecycle: Arc<LifecycleManager>,
    /// Engine counters
    pub stats: Arc<EngineStats>,
    /// Alert database, when configured
    pub alerts: Option<SqliteAlertSink>,
    /// Prometheus recorder handle
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        stats: Arc<EngineStats>,
        alerts: Option<SqliteAlertSink>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            lifecycle,
            stats,
            alerts,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::get_health))
        .route("/api/v1/rules", get(routes::rules::get_rules))
        .route("/metrics", get(routes::metrics::get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), ServiceError> {
    let level = Level::from_str(&config.level).map_err(|_| ServiceError::LogLevel(config.level.clone()))?;
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ServiceError::Logging(e.to_string()))
}
