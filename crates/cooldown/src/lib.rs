//! Cooldown Tracking
//!
//! Decides whether a rule may fire at a given instant and records the
//! firing atomically, so concurrent readings for the same rule admit at
//! most one firing per cooldown window.

mod snapshot;
mod tracker;

pub use snapshot::{CooldownSnapshot, SnapshotError};
pub use tracker::CooldownTracker;
