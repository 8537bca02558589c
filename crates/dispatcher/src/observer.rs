//! Observability Hooks
//!
//! Evaluation and dispatch report here; the dashboard's alerting views are
//! computed from what these hooks record.

use metrics::{counter, histogram};
use rule_model::{DeploymentId, FireEvent, Reading, RuleId};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::DispatchError;

/// Problem evaluating a reading, isolated to that reading
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationFault {
    /// Reading value is NaN; no rule can fire on it
    NonFiniteReading { deployment: DeploymentId, value: f64 },

    /// Rule reached evaluation without a cooldown slot
    MissingCooldown { rule_id: RuleId },
}

impl fmt::Display for EvaluationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationFault::NonFiniteReading { deployment, value } => {
                write!(f, "non-finite reading {value} for deployment {deployment}")
            }
            EvaluationFault::MissingCooldown { rule_id } => {
                write!(f, "no cooldown slot for {rule_id}")
            }
        }
    }
}

/// Observability collaborator
pub trait Observer: Send + Sync {
    /// A reading was matched against `rules` watching rules
    fn reading_evaluated(&self, _reading: &Reading, _rules: usize) {}

    /// A rule passed its condition and cooldown gate
    fn rule_fired(&self, _event: &FireEvent) {}

    /// A rule's condition held but its cooldown suppressed the firing
    fn rule_suppressed(&self, _rule_id: RuleId) {}

    /// A sink acknowledged a dispatch
    fn dispatch_succeeded(&self, _event: &FireEvent, _latency: Duration) {}

    /// A dispatch failed; it will not be retried
    fn dispatch_failed(&self, _event: &FireEvent, _error: &DispatchError) {}

    /// A reading could not be evaluated normally
    fn evaluation_fault(&self, _fault: &EvaluationFault) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Running totals since start
#[derive(Debug, Default)]
pub struct EngineStats {
    readings_evaluated: AtomicU64,
    rules_fired: AtomicU64,
    rules_suppressed: AtomicU64,
    dispatch_succeeded: AtomicU64,
    dispatch_failed: AtomicU64,
    evaluation_faults: AtomicU64,
}

/// Point-in-time copy of `EngineStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub readings_evaluated: u64,
    pub rules_fired: u64,
    pub rules_suppressed: u64,
    pub dispatch_succeeded: u64,
    pub dispatch_failed: u64,
    pub evaluation_faults: u64,
}

impl EngineStats {
    /// Create zeroed stats
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Read all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings_evaluated: self.readings_evaluated.load(Ordering::Relaxed),
            rules_fired: self.rules_fired.load(Ordering::Relaxed),
            rules_suppressed: self.rules_suppressed.load(Ordering::Relaxed),
            dispatch_succeeded: self.dispatch_succeeded.load(Ordering::Relaxed),
            dispatch_failed: self.dispatch_failed.load(Ordering::Relaxed),
            evaluation_faults: self.evaluation_faults.load(Ordering::Relaxed),
        }
    }
}

/// Observer backed by the `metrics` facade plus local counters
#[derive(Debug, Clone)]
pub struct MetricsObserver {
    stats: Arc<EngineStats>,
}

impl MetricsObserver {
    /// Create an observer writing into `stats`
    pub fn new(stats: Arc<EngineStats>) -> Self {
        Self { stats }
    }

    /// Shared counters
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }
}

impl Observer for MetricsObserver {
    fn reading_evaluated(&self, _reading: &Reading, rules: usize) {
        self.stats.readings_evaluated.fetch_add(1, Ordering::Relaxed);
        counter!("automation_readings_evaluated_total").increment(1);
        histogram!("automation_rules_per_reading").record(rules as f64);
    }

    fn rule_fired(&self, event: &FireEvent) {
        self.stats.rules_fired.fetch_add(1, Ordering::Relaxed);
        counter!("automation_rules_fired_total", "action" => event.action.kind()).increment(1);
    }

    fn rule_suppressed(&self, rule_id: RuleId) {
        self.stats.rules_suppressed.fetch_add(1, Ordering::Relaxed);
        counter!("automation_rules_suppressed_total").increment(1);
        debug!("{} suppressed by cooldown", rule_id);
    }

    fn dispatch_succeeded(&self, event: &FireEvent, latency: Duration) {
        self.stats.dispatch_succeeded.fetch_add(1, Ordering::Relaxed);
        counter!("automation_dispatch_success_total", "action" => event.action.kind()).increment(1);
        histogram!("automation_dispatch_latency_seconds").record(latency.as_secs_f64());
    }

    fn dispatch_failed(&self, event: &FireEvent, error: &DispatchError) {
        self.stats.dispatch_failed.fetch_add(1, Ordering::Relaxed);
        counter!(
            "automation_dispatch_failures_total",
            "sink" => error.sink(),
            "reason" => error.reason()
        )
        .increment(1);
        warn!(
            "Dispatch of {} for {} failed: {}",
            event.event_id, event.rule_id, error
        );
    }

    fn evaluation_fault(&self, fault: &EvaluationFault) {
        self.stats.evaluation_faults.fetch_add(1, Ordering::Relaxed);
        counter!("automation_evaluation_faults_total").increment(1);
        warn!("Evaluation fault: {}", fault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::alert_event;

    #[test]
    fn test_metrics_observer_counts() {
        let stats = EngineStats::new();
        let observer = MetricsObserver::new(Arc::clone(&stats));
        let event = alert_event(1);

        observer.rule_fired(&event);
        observer.rule_suppressed(RuleId(1));
        observer.dispatch_failed(&event, &DispatchError::Overloaded);
        observer.evaluation_fault(&EvaluationFault::NonFiniteReading {
            deployment: DeploymentId(3),
            value: f64::NAN,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rules_fired, 1);
        assert_eq!(snapshot.rules_suppressed, 1);
        assert_eq!(snapshot.dispatch_failed, 1);
        assert_eq!(snapshot.evaluation_faults, 1);
        assert_eq!(snapshot.dispatch_succeeded, 0);
    }

    #[test]
    fn test_fault_display() {
        let fault = EvaluationFault::MissingCooldown { rule_id: RuleId(4) };
        assert_eq!(fault.to_string(), "no cooldown slot for rule-4");
    }
}
