//! HTTP Routes

pub mod health;
pub mod metrics;
pub mod rules;
