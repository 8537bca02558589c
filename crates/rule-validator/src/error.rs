//! Validation Error Types

use thiserror::Error;

/// Reasons a rule draft is rejected at admission
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field present but blank
    #[error("Field must not be empty: {0}")]
    EmptyField(&'static str),

    /// Field longer than allowed
    #[error("{field} is {len} characters long, at most {max} allowed")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Threshold is NaN or infinite
    #[error("Threshold must be a finite number, got {0}")]
    NonFiniteThreshold(f64),

    /// Operator string not recognized
    #[error("Unknown comparison operator: {0:?}")]
    UnknownOperator(String),

    /// Action type not recognized
    #[error("Unknown action type: {0:?}")]
    UnknownActionType(String),

    /// Severity string not recognized
    #[error("Unknown alert severity: {0:?}")]
    UnknownSeverity(String),
}
