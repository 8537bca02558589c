//! Rule Actions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::DeploymentId;

/// Severity string that does not name a known level
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown alert severity: {0:?}")]
pub struct UnknownSeverity(pub String);

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = UnknownSeverity;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(AlertSeverity::Info),
            "warning" | "warn" => Ok(AlertSeverity::Warning),
            "error" => Ok(AlertSeverity::Error),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(UnknownSeverity(raw.to_string())),
        }
    }
}

/// Side effect requested when a rule fires.
///
/// The variant is fixed when the rule is admitted; each variant carries
/// exactly the fields its sink needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Raise an operator-facing alert
    CreateAlert {
        title: String,
        message: String,
        severity: AlertSeverity,
    },

    /// Send a command to an actuator
    TriggerActuator {
        target_deployment_id: DeploymentId,
        command: String,
        #[serde(default)]
        parameters: Map<String, Value>,
    },
}

impl ActionSpec {
    /// Short name of the action kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::CreateAlert { .. } => "create_alert",
            ActionSpec::TriggerActuator { .. } => "trigger_actuator",
        }
    }
}
