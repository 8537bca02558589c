//! Cooldown Snapshots
//!
//! Lets the persistence layer carry `last_fired_at` across restarts so a
//! restart does not reopen every cooldown window.

use chrono::{DateTime, Utc};
use rule_model::RuleId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot encoding errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to encode cooldown snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode cooldown snapshot: {0}")]
    Decode(String),
}

/// Last firing time of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub rule_id: RuleId,
    pub last_fired_ms: i64,
}

impl SnapshotEntry {
    /// Last firing time as a timestamp
    pub fn last_fired_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.last_fired_ms)
    }
}

/// Point-in-time export of cooldown state, sorted by rule id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl CooldownSnapshot {
    /// Encode with postcard
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        postcard::to_allocvec(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode a postcard-encoded snapshot
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        postcard::from_bytes(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))
    }

    /// Number of rules in the snapshot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
