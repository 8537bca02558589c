//! Rule Routes

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rule_model::{AutomationRule, RuleId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

/// Query parameters for the rules endpoint
#[derive(Debug, Deserialize)]
pub struct RuleQuery {
    /// Only active rules
    #[serde(default)]
    pub active: Option<bool>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// Rule as shown on the dashboard
#[derive(Debug, Serialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub name: String,
    pub condition: String,
    pub action: &'static str,
    pub is_active: bool,
    pub cooldown_seconds: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl From<&AutomationRule> for RuleSummary {
    fn from(rule: &AutomationRule) -> Self {
        Self {
            id: rule.id,
            name: rule.name.clone(),
            condition: rule.condition_summary(),
            action: rule.action.kind(),
            is_active: rule.is_active,
            cooldown_seconds: rule.cooldown.as_secs(),
            last_fired_at: rule.last_fired_at,
        }
    }
}

/// Response for the rules endpoint
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub total: usize,
    pub active: usize,
    pub data: Vec<RuleSummary>,
}

/// List rules
pub async fn get_rules(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RuleQuery>,
) -> Json<RulesResponse> {
    let rules = state.lifecycle.list();
    let active = rules.iter().filter(|r| r.is_active).count();

    let data = rules
        .iter()
        .filter(|r| params.active.map_or(true, |active| r.is_active == active))
        .take(params.limit)
        .map(RuleSummary::from)
        .collect();

    Json(RulesResponse {
        total: rules.len(),
        active,
        data,
    })
}
