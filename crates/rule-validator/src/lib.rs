//! Rule Admission and Normalization
//!
//! Turns loosely typed rule drafts from the authoring layer into validated
//! `AutomationRule`s: operator strings are normalized to one closed set,
//! flat optional action fields become a tagged action, and malformed rules
//! are rejected before they can reach the rule store.

mod draft;
mod error;
mod validator;

pub use draft::{ActionDraft, RuleDraft};
pub use error::ValidationError;
pub use validator::{ValidationConfig, ValidationResult, Validator};
