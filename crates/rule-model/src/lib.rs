//! Automation Rule Model
//!
//! Shared types for the automation rule engine:
//! - Opaque identifiers for rules and sensor deployments
//! - Sensor readings and comparison operators
//! - Rule actions (alert creation, actuator commands)
//! - Fire events and the payloads forwarded to external sinks

mod action;
mod ids;
mod operator;
mod reading;
mod rule;

pub use action::{ActionSpec, AlertSeverity, UnknownSeverity};
pub use ids::{DeploymentId, RuleId};
pub use operator::{ComparisonOperator, UnknownOperator};
pub use reading::{ActuatorCommand, AlertRequest, FireEvent, Reading};
pub use rule::AutomationRule;

/// Serialize a `Duration` as whole seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
