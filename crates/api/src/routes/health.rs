//! Health Route

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use dispatcher::StatsSnapshot;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub rules: RuleCounts,
    pub engine: StatsSnapshot,
    /// Present when alerts are stored
    pub unread_alerts: Option<i64>,
}

/// Rule counts
#[derive(Debug, Serialize)]
pub struct RuleCounts {
    pub total: usize,
    pub active: usize,
    pub watched_deployments: usize,
}

/// Health check handler
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = state.lifecycle.store();

    let unread_alerts = match &state.alerts {
        Some(alerts) => match alerts.unread_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Unread alert count unavailable: {}", e);
                None
            }
        },
        None => None,
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        rules: RuleCounts {
            total: store.len(),
            active: store.active_count(),
            watched_deployments: store.watched_deployments(),
        },
        engine: state.stats.snapshot(),
        unread_alerts,
    })
}
