//! Log-only Sinks

use async_trait::async_trait;
use dispatcher::{ActuatorSink, AlertSink, SinkError};
use rule_model::{ActuatorCommand, AlertRequest, AlertSeverity};
use tracing::{info, warn};

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &'static str {
        "log-alerts"
    }

    async fn create_alert(&self, alert: &AlertRequest) -> Result<(), SinkError> {
        match alert.severity {
            AlertSeverity::Error | AlertSeverity::Critical => warn!(
                "[{}] {}: {} (value {}, {})",
                alert.severity, alert.title, alert.message, alert.observed_value, alert.rule_id
            ),
            AlertSeverity::Info | AlertSeverity::Warning => info!(
                "[{}] {}: {} (value {}, {})",
                alert.severity, alert.title, alert.message, alert.observed_value, alert.rule_id
            ),
        }
        Ok(())
    }
}

/// Writes actuator commands to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActuatorSink;

#[async_trait]
impl ActuatorSink for LogActuatorSink {
    fn name(&self) -> &'static str {
        "log-actuators"
    }

    async fn send_command(&self, command: &ActuatorCommand) -> Result<(), SinkError> {
        info!(
            "Actuator #{} <- {} {} ({})",
            command.target_deployment_id,
            command.command,
            serde_json::Value::Object(command.parameters.clone()),
            command.rule_id
        );
        Ok(())
    }
}
