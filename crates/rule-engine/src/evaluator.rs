//! Evaluation Engine

use cooldown::CooldownTracker;
use dispatcher::{EvaluationFault, FireEventSink, Observer};
use rule_model::{AutomationRule, FireEvent, Reading};
use rule_store::RuleStore;
use std::sync::Arc;
use tracing::{debug, info};

/// What one reading did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOutcome {
    /// Active rules watching the reading's deployment
    pub watching: usize,
    /// Rules whose condition held
    pub matched: usize,
    /// Rules that passed the cooldown gate
    pub fired: usize,
    /// Rules whose condition held inside their cooldown window
    pub suppressed: usize,
    /// Fired events the dispatch queue refused
    pub rejected: usize,
}

/// Matches readings against the rules watching their deployment.
///
/// `on_reading` never waits on I/O: fire events are handed to a
/// non-blocking sink and a refusal is reported, not retried.
pub struct Evaluator {
    store: Arc<RuleStore>,
    cooldowns: Arc<CooldownTracker>,
    sink: Arc<dyn FireEventSink>,
    observer: Arc<dyn Observer>,
}

impl Evaluator {
    /// Create an evaluator
    pub fn new(
        store: Arc<RuleStore>,
        cooldowns: Arc<CooldownTracker>,
        sink: Arc<dyn FireEventSink>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        info!("Creating evaluator over {} rules", store.len());
        Self {
            store,
            cooldowns,
            sink,
            observer,
        }
    }

    /// Evaluate one reading against every active rule watching its deployment
    pub fn on_reading(&self, reading: &Reading) -> EvaluationOutcome {
        if reading.value.is_nan() {
            self.observer.evaluation_fault(&EvaluationFault::NonFiniteReading {
                deployment: reading.sensor_deployment_id,
                value: reading.value,
            });
            return EvaluationOutcome::default();
        }

        let rules = self.store.rules_watching(reading.sensor_deployment_id);
        let mut outcome = EvaluationOutcome {
            watching: rules.len(),
            ..Default::default()
        };
        self.observer.reading_evaluated(reading, rules.len());

        for rule in rules.iter() {
            self.evaluate_rule(rule, reading, &mut outcome);
        }

        outcome
    }

    fn evaluate_rule(&self, rule: &AutomationRule, reading: &Reading, outcome: &mut EvaluationOutcome) {
        if !rule.matches(reading.value) {
            return;
        }
        outcome.matched += 1;

        if !self.cooldowns.try_acquire(rule.id, reading.observed_at) {
            if self.cooldowns.contains(rule.id) {
                outcome.suppressed += 1;
                self.observer.rule_suppressed(rule.id);
            } else if self.store.get(rule.id).is_none() {
                // removed after this reading took its watch-list
                debug!("{} removed during evaluation", rule.id);
            } else {
                self.observer
                    .evaluation_fault(&EvaluationFault::MissingCooldown { rule_id: rule.id });
            }
            return;
        }

        let event = FireEvent::new(rule, reading);
        debug!(
            "{} fired: {} with value {}",
            rule.id,
            rule.condition_summary(),
            reading.value
        );
        self.observer.rule_fired(&event);
        outcome.fired += 1;

        if let Err(e) = self.sink.submit(event.clone()) {
            outcome.rejected += 1;
            self.observer.dispatch_failed(&event, &e);
        }
    }
}
