//! Sink Interfaces

use async_trait::async_trait;
use rule_model::{ActuatorCommand, AlertRequest, FireEvent};

use crate::{DispatchError, SinkError};

/// External alert system
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Create one alert
    async fn create_alert(&self, alert: &AlertRequest) -> Result<(), SinkError>;
}

/// External actuator-command channel
#[async_trait]
pub trait ActuatorSink: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Deliver one command
    async fn send_command(&self, command: &ActuatorCommand) -> Result<(), SinkError>;
}

/// Receives fire events from the evaluation engine without blocking it
pub trait FireEventSink: Send + Sync {
    /// Hand off an event; fails immediately instead of waiting for capacity
    fn submit(&self, event: FireEvent) -> Result<(), DispatchError>;
}
