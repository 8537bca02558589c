//! Readings, Fire Events, and Sink Payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ActionSpec, AlertSeverity, AutomationRule, DeploymentId, RuleId};

/// A single sensor observation, consumed once
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_deployment_id: DeploymentId,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    /// Create a new reading
    pub fn new(sensor_deployment_id: DeploymentId, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            sensor_deployment_id,
            value,
            observed_at,
        }
    }
}

/// A rule that passed both its condition and its cooldown gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireEvent {
    /// Unique per firing, lets sinks de-duplicate
    pub event_id: Uuid,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub fired_at: DateTime<Utc>,
    pub observed_value: f64,
    pub action: ActionSpec,
}

impl FireEvent {
    /// Build the event for `rule` firing on `reading`
    pub fn new(rule: &AutomationRule, reading: &Reading) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            fired_at: reading.observed_at,
            observed_value: reading.value,
            action: rule.action.clone(),
        }
    }
}

/// Payload forwarded to the alert sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub rule_id: RuleId,
    pub observed_value: f64,
    pub fired_at: DateTime<Utc>,
}

/// Payload forwarded to the actuator-command sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub target_deployment_id: DeploymentId,
    pub command: String,
    pub parameters: Map<String, Value>,
    pub rule_id: RuleId,
    pub fired_at: DateTime<Utc>,
}
