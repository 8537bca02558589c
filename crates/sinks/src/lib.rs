//! External Adapters
//!
//! Concrete collaborators for the engine:
//! - MQTT reading source and actuator-command sink
//! - SQLite alert sink backing the dashboard's unread alerts
//! - Log-only sinks for running without external systems

mod log;
mod mqtt;
mod sqlite;

pub use log::{LogActuatorSink, LogAlertSink};
pub use mqtt::{
    connect, parse_deployment, parse_reading, MqttActuatorSink, MqttConfig, MqttReadingSource,
    ReadingPayload,
};
pub use sqlite::{SqliteAlertSink, StoredAlert};

use thiserror::Error;

/// Adapter errors
#[derive(Error, Debug)]
pub enum SinkSetupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("Malformed reading on {topic}: {reason}")]
    MalformedReading { topic: String, reason: String },
}
