//! MQTT Transport
//!
//! Readings arrive on `sensors/{deployment}/readings`; actuator commands are
//! published to `{prefix}/{deployment}/commands`. One connection serves both,
//! driven by the reading source's event loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatcher::{ActuatorSink, SinkError};
use rule_engine::{PipelineError, ReadingSender};
use rule_model::{ActuatorCommand, DeploymentId, Reading};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::SinkSetupError;

/// MQTT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Connect to the broker at startup
    pub enabled: bool,
    /// Broker host
    pub broker_host: String,
    /// Broker port
    pub broker_port: u16,
    /// Client id presented to the broker
    pub client_id: String,
    /// Subscription filter for sensor readings
    pub reading_topic: String,
    /// Topic prefix for actuator commands
    pub command_topic_prefix: String,
    /// Keep-alive interval (seconds)
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "automation-engine".to_string(),
            reading_topic: "sensors/+/readings".to_string(),
            command_topic_prefix: "actuators".to_string(),
            keep_alive_secs: 30,
        }
    }
}

/// Create a client and the event loop that drives it
pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    info!(
        "Connecting to MQTT broker {}:{} as {}",
        config.broker_host, config.broker_port, config.client_id
    );
    AsyncClient::new(options, 64)
}

/// Publishes actuator commands as JSON
#[derive(Clone)]
pub struct MqttActuatorSink {
    client: AsyncClient,
    prefix: String,
}

impl MqttActuatorSink {
    /// Create a sink publishing under `prefix`
    pub fn new(client: AsyncClient, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Command topic of an actuator deployment
    pub fn topic_for(&self, target: DeploymentId) -> String {
        format!("{}/{}/commands", self.prefix, target)
    }
}

#[async_trait]
impl ActuatorSink for MqttActuatorSink {
    fn name(&self) -> &'static str {
        "mqtt-actuators"
    }

    async fn send_command(&self, command: &ActuatorCommand) -> Result<(), SinkError> {
        let payload =
            serde_json::to_vec(command).map_err(|e| SinkError::Rejected(e.to_string()))?;
        let topic = self.topic_for(command.target_deployment_id);

        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        debug!("Published {} to {}", command.command, topic);
        Ok(())
    }
}

/// Body of a reading message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingPayload {
    pub value: f64,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Deployment id from a `.../sensors/{id}/...` topic
pub fn parse_deployment(topic: &str) -> Option<DeploymentId> {
    let mut segments = topic.split('/');
    segments.find(|s| *s == "sensors")?;
    segments.next()?.parse::<u64>().ok().map(DeploymentId)
}

/// Decode a reading message; a missing timestamp means `now`
pub fn parse_reading(topic: &str, payload: &[u8], now: DateTime<Utc>) -> Result<Reading, SinkSetupError> {
    let malformed = |reason: String| SinkSetupError::MalformedReading {
        topic: topic.to_string(),
        reason,
    };

    let deployment =
        parse_deployment(topic).ok_or_else(|| malformed("no deployment id in topic".to_string()))?;
    let body: ReadingPayload = serde_json::from_slice(payload).map_err(|e| malformed(e.to_string()))?;

    Ok(Reading::new(deployment, body.value, body.observed_at.unwrap_or(now)))
}

/// Feeds readings from the broker into the pipeline
pub struct MqttReadingSource {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    sender: ReadingSender,
}

impl MqttReadingSource {
    /// Create a source subscribing to `topic`
    pub fn new(client: AsyncClient, eventloop: EventLoop, topic: &str, sender: ReadingSender) -> Self {
        Self {
            client,
            eventloop,
            topic: topic.to_string(),
            sender,
        }
    }

    /// Drive the connection until `shutdown` resolves or the pipeline closes
    pub async fn run<S>(mut self, shutdown: S) -> Result<(), SinkSetupError>
    where
        S: Future<Output = ()>,
    {
        info!("Starting MQTT reading source on {}", self.topic);
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // subscriptions do not survive a reconnect with a clean session
                    self.client
                        .try_subscribe(&self.topic, QoS::AtLeastOnce)
                        .map_err(|e| SinkSetupError::Mqtt(e.to_string()))?;
                    info!("Subscribed to {}", self.topic);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match parse_reading(&publish.topic, &publish.payload, Utc::now()) {
                        Ok(reading) => match self.sender.send(reading).await {
                            Ok(()) => {}
                            Err(PipelineError::Closed) => break,
                            Err(e) => warn!("Dropped reading: {}", e),
                        },
                        Err(e) => warn!("Skipping message: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT error: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect: {}", e);
        }
        info!("MQTT reading source stopped");
        Ok(())
    }
}
