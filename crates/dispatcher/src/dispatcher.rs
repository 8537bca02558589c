//! Action Dispatcher

use rule_model::{ActionSpec, ActuatorCommand, AlertRequest, FireEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::observer::Observer;
use crate::queue::{DispatchHandle, DispatchWorker};
use crate::sink::{ActuatorSink, AlertSink};
use crate::DispatchError;

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-request sink timeout (ms)
    pub timeout_ms: u64,
    /// Fire events buffered ahead of the sinks
    pub queue_capacity: usize,
    /// Sink requests allowed in flight at once
    pub max_in_flight: usize,
    /// Time allowed for in-flight requests on shutdown (ms)
    pub shutdown_grace_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            queue_capacity: 1024,
            max_in_flight: 64,
            shutdown_grace_ms: 10_000,
        }
    }
}

impl DispatchConfig {
    /// Per-request sink timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Shutdown grace period
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Routes fire events to the sink matching their action
pub struct Dispatcher {
    alerts: Arc<dyn AlertSink>,
    actuators: Arc<dyn ActuatorSink>,
    observer: Arc<dyn Observer>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over the given sinks
    pub fn new(
        alerts: Arc<dyn AlertSink>,
        actuators: Arc<dyn ActuatorSink>,
        observer: Arc<dyn Observer>,
        config: &DispatchConfig,
    ) -> Self {
        info!(
            "Creating dispatcher: alerts={}, actuators={}, timeout={}ms",
            alerts.name(),
            actuators.name(),
            config.timeout_ms
        );
        Self {
            alerts,
            actuators,
            observer,
            timeout: config.timeout(),
        }
    }

    /// Split into a non-blocking handle for the engine and the worker driving the sinks
    pub fn channel(self, config: &DispatchConfig) -> (DispatchHandle, DispatchWorker) {
        DispatchWorker::channel(Arc::new(self), config)
    }

    /// Deliver one event and report the outcome. Failures are not retried.
    pub async fn dispatch(&self, event: &FireEvent) -> Result<(), DispatchError> {
        let started = Instant::now();

        let result = match SinkRequest::for_event(event) {
            SinkRequest::Alert(request) => {
                self.deliver(self.alerts.name(), self.alerts.create_alert(&request))
                    .await
            }
            SinkRequest::Actuator(command) => {
                self.deliver(self.actuators.name(), self.actuators.send_command(&command))
                    .await
            }
        };

        match &result {
            Ok(()) => {
                debug!(
                    "Dispatched {} for {} in {:?}",
                    event.action.kind(),
                    event.rule_id,
                    started.elapsed()
                );
                self.observer.dispatch_succeeded(event, started.elapsed());
            }
            Err(e) => self.observer.dispatch_failed(event, e),
        }

        result
    }

    async fn deliver<F>(&self, sink: &'static str, request: F) -> Result<(), DispatchError>
    where
        F: std::future::Future<Output = Result<(), crate::SinkError>>,
    {
        match timeout(self.timeout, request).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DispatchError::from_sink(sink, e)),
            Err(_) => Err(DispatchError::Timeout {
                sink,
                after: self.timeout,
            }),
        }
    }
}

/// Payload a fire event produces for exactly one sink
#[derive(Debug, Clone)]
pub enum SinkRequest {
    Alert(AlertRequest),
    Actuator(ActuatorCommand),
}

impl SinkRequest {
    /// Build the sink payload for `event`'s action
    pub fn for_event(event: &FireEvent) -> Self {
        match &event.action {
            ActionSpec::CreateAlert {
                title,
                message,
                severity,
            } => SinkRequest::Alert(AlertRequest {
                title: title.clone(),
                message: message.clone(),
                severity: *severity,
                rule_id: event.rule_id,
                observed_value: event.observed_value,
                fired_at: event.fired_at,
            }),
            ActionSpec::TriggerActuator {
                target_deployment_id,
                command,
                parameters,
            } => SinkRequest::Actuator(ActuatorCommand {
                target_deployment_id: *target_deployment_id,
                command: command.clone(),
                parameters: parameters.clone(),
                rule_id: event.rule_id,
                fired_at: event.fired_at,
            }),
        }
    }
}

/// Alert payload for an event, if its action creates an alert
pub fn alert_request(event: &FireEvent) -> Option<AlertRequest> {
    match SinkRequest::for_event(event) {
        SinkRequest::Alert(request) => Some(request),
        SinkRequest::Actuator(_) => None,
    }
}

/// Actuator payload for an event, if its action triggers an actuator
pub fn actuator_command(event: &FireEvent) -> Option<ActuatorCommand> {
    match SinkRequest::for_event(event) {
        SinkRequest::Actuator(command) => Some(command),
        SinkRequest::Alert(_) => None,
    }
}
