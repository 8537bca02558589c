//! Automation Rule Engine
//!
//! Evaluates incoming sensor readings against the active rules:
//! - Fan-out from a reading to the rules watching its deployment
//! - Condition check, then the per-rule cooldown gate
//! - Fire events handed to dispatch without waiting on any sink
//! - Rule lifecycle (create, update, activate, deactivate, remove)
//! - A sharded reading pipeline that keeps per-deployment arrival order

mod evaluator;
mod lifecycle;
mod pipeline;

pub use evaluator::{EvaluationOutcome, Evaluator};
pub use lifecycle::{DraftOutcome, LifecycleManager};
pub use pipeline::{PipelineConfig, ReadingPipeline, ReadingSender};

use rule_model::RuleId;
use rule_store::StoreError;
use rule_validator::ValidationError;
use thiserror::Error;

/// Rule lifecycle errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid rule: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Rule not found: {0}")]
    NotFound(RuleId),

    #[error("Rule already exists: {0}")]
    AlreadyExists(RuleId),

    #[error("Malformed rule document: {0}")]
    Malformed(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(rule_id) => LifecycleError::NotFound(rule_id),
            other => LifecycleError::Store(other),
        }
    }
}

/// Reading pipeline errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Reading queue is full")]
    Full,

    #[error("Reading pipeline is shut down")]
    Closed,
}
