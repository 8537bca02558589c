//! Rule Drafts as Submitted by the Authoring Layer

use rule_model::{DeploymentId, RuleId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unvalidated rule as authored in the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    /// Present when editing an existing rule
    #[serde(default)]
    pub id: Option<RuleId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sensor_deployment_id: Option<DeploymentId>,
    /// Any accepted spelling (`gt`, `>`, `greater_than`, ...)
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub threshold_value: Option<f64>,
    #[serde(flatten)]
    pub action: ActionDraft,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub cooldown_seconds: u64,
}

fn default_active() -> bool {
    true
}

/// Flat action fields; which ones apply depends on `action_type`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDraft {
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub alert_title: Option<String>,
    #[serde(default)]
    pub alert_message: Option<String>,
    #[serde(default)]
    pub alert_severity: Option<String>,
    #[serde(default)]
    pub target_deployment_id: Option<DeploymentId>,
    #[serde(default)]
    pub actuator_command: Option<String>,
    #[serde(default)]
    pub command_parameters: Option<Map<String, Value>>,
}

impl ActionDraft {
    /// Draft for an alert action
    pub fn alert(title: &str, message: &str, severity: &str) -> Self {
        Self {
            action_type: "create_alert".to_string(),
            alert_title: Some(title.to_string()),
            alert_message: Some(message.to_string()),
            alert_severity: Some(severity.to_string()),
            ..Default::default()
        }
    }

    /// Draft for an actuator command action
    pub fn actuator(target: u64, command: &str) -> Self {
        Self {
            action_type: "trigger_actuator".to_string(),
            target_deployment_id: Some(DeploymentId(target)),
            actuator_command: Some(command.to_string()),
            ..Default::default()
        }
    }
}
