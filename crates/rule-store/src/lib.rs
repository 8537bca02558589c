//! Rule Store
//!
//! Primary map of rules plus a watch-list index from sensor deployment to
//! the active rules watching it.

mod store;

pub use store::{RuleStore, WatchList};

use rule_model::RuleId;
use thiserror::Error;

/// Rule store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Lock error: {0}")]
    LockPoisoned(String),
    #[error("Rule not found: {0}")]
    NotFound(RuleId),
}
