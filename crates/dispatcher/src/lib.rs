//! Action Dispatch
//!
//! Delivers fired rules to the external alert and actuator sinks:
//! - Sink traits implemented by transport adapters
//! - Timeout-guarded dispatch with failure reporting (never retried)
//! - A bounded queue so evaluation never waits on a slow sink
//! - The observability hooks fed by evaluation and dispatch

mod dispatcher;
mod observer;
mod queue;
mod sink;

pub use dispatcher::{actuator_command, alert_request, DispatchConfig, Dispatcher, SinkRequest};
pub use observer::{EngineStats, EvaluationFault, MetricsObserver, NoopObserver, Observer, StatsSnapshot};
pub use queue::{DispatchHandle, DispatchWorker};
pub use sink::{ActuatorSink, AlertSink, FireEventSink};

use std::time::Duration;
use thiserror::Error;

/// Error returned by a sink implementation
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Sink could not be reached
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// Sink refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Dispatch failure, reported to the observer and never retried
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{sink} sink unavailable: {reason}")]
    Unavailable { sink: &'static str, reason: String },

    #[error("{sink} sink rejected the request: {reason}")]
    Rejected { sink: &'static str, reason: String },

    #[error("{sink} sink timed out after {after:?}")]
    Timeout { sink: &'static str, after: Duration },

    #[error("Dispatch queue is full")]
    Overloaded,

    #[error("Dispatcher is shut down")]
    Closed,
}

impl DispatchError {
    /// Failure class, used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::Unavailable { .. } => "unavailable",
            DispatchError::Rejected { .. } => "rejected",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::Overloaded => "overloaded",
            DispatchError::Closed => "closed",
        }
    }

    /// Sink involved, if the failure happened at a sink
    pub fn sink(&self) -> &'static str {
        match self {
            DispatchError::Unavailable { sink, .. }
            | DispatchError::Rejected { sink, .. }
            | DispatchError::Timeout { sink, .. } => *sink,
            DispatchError::Overloaded | DispatchError::Closed => "queue",
        }
    }

    pub(crate) fn from_sink(sink: &'static str, error: SinkError) -> Self {
        match error {
            SinkError::Unavailable(reason) => DispatchError::Unavailable { sink, reason },
            SinkError::Rejected(reason) => DispatchError::Rejected { sink, reason },
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rule_model::{
        ActionSpec, ActuatorCommand, AlertRequest, AlertSeverity, DeploymentId, FireEvent, RuleId,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn alert_event(rule_id: u64) -> FireEvent {
        FireEvent {
            event_id: Default::default(),
            rule_id: RuleId(rule_id),
            rule_name: "Low water".to_string(),
            fired_at: Utc::now(),
            observed_value: 20.0,
            action: ActionSpec::CreateAlert {
                title: "Low water".to_string(),
                message: "Tank below 30%".to_string(),
                severity: AlertSeverity::Warning,
            },
        }
    }

    pub fn actuator_event(rule_id: u64, target: u64) -> FireEvent {
        FireEvent {
            action: ActionSpec::TriggerActuator {
                target_deployment_id: DeploymentId(target),
                command: "ON".to_string(),
                parameters: serde_json::Map::new(),
            },
            ..alert_event(rule_id)
        }
    }

    /// Sink that records requests, optionally failing or stalling
    #[derive(Default)]
    pub struct RecordingSink {
        pub alerts: Mutex<Vec<AlertRequest>>,
        pub commands: Mutex<Vec<ActuatorCommand>>,
        pub fail_with: Option<SinkError>,
        pub delay: Option<Duration>,
    }

    impl RecordingSink {
        async fn outcome(&self) -> Result<(), SinkError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording-alerts"
        }

        async fn create_alert(&self, alert: &AlertRequest) -> Result<(), SinkError> {
            self.outcome().await?;
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl ActuatorSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording-actuators"
        }

        async fn send_command(&self, command: &ActuatorCommand) -> Result<(), SinkError> {
            self.outcome().await?;
            self.commands.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    /// Observer that keeps dispatch outcomes
    #[derive(Default)]
    pub struct RecordingObserver {
        pub succeeded: AtomicUsize,
        pub failures: Mutex<Vec<DispatchError>>,
    }

    impl Observer for RecordingObserver {
        fn dispatch_succeeded(&self, _event: &FireEvent, _latency: Duration) {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }

        fn dispatch_failed(&self, _event: &FireEvent, error: &DispatchError) {
            self.failures.lock().unwrap().push(error.clone());
        }
    }
}
