//! Automation Rule

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ActionSpec, ComparisonOperator, DeploymentId, RuleId};

/// A threshold rule watching one sensor deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Assigned at creation, immutable
    pub id: RuleId,
    /// Free text
    pub name: String,
    /// Free text
    #[serde(default)]
    pub description: String,
    /// The single condition input
    pub sensor_deployment_id: DeploymentId,
    /// Comparison applied to each reading
    pub operator: ComparisonOperator,
    /// Right-hand side of the comparison
    pub threshold_value: f64,
    /// Side effect requested on fire
    pub action: ActionSpec,
    /// Inactive rules are kept but never evaluated
    pub is_active: bool,
    /// Minimum spacing between two firings
    #[serde(rename = "cooldown_seconds", with = "crate::duration_secs")]
    pub cooldown: Duration,
    /// Last firing time, written only by the engine
    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
    /// Check the rule condition against an observed value
    pub fn matches(&self, observed: f64) -> bool {
        self.operator.evaluate(self.threshold_value, observed)
    }

    /// Human-readable condition, e.g. `#7 < 200`
    pub fn condition_summary(&self) -> String {
        format!(
            "#{} {} {}",
            self.sensor_deployment_id,
            self.operator.symbol(),
            self.threshold_value
        )
    }
}
