//! Rule Lifecycle Manager
//!
//! The only mutation surface for rules. A cooldown slot is registered
//! before a rule becomes visible in the store and forgotten only after the
//! rule has left it, so evaluation never sees a rule without a slot.
//! Writes that check the store before changing it run under one lock.

use cooldown::CooldownTracker;
use rule_model::{AutomationRule, RuleId};
use rule_store::{RuleStore, StoreError};
use rule_validator::{RuleDraft, Validator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::LifecycleError;

/// Result of admitting one entry of a bulk load
#[derive(Debug)]
pub struct DraftOutcome {
    /// Position in the submitted array
    pub index: usize,
    /// Name as submitted
    pub name: String,
    pub result: Result<Arc<AutomationRule>, LifecycleError>,
}

/// Applies authoring operations to the rule store and cooldown tracker
pub struct LifecycleManager {
    store: Arc<RuleStore>,
    cooldowns: Arc<CooldownTracker>,
    validator: Validator,
    next_id: AtomicU64,
    writes: Mutex<()>,
}

impl LifecycleManager {
    /// Create a manager over shared engine state
    pub fn new(store: Arc<RuleStore>, cooldowns: Arc<CooldownTracker>, validator: Validator) -> Self {
        let next_id = store.all().last().map(|r| r.id.0 + 1).unwrap_or(1);
        Self {
            store,
            cooldowns,
            validator,
            next_id: AtomicU64::new(next_id),
            writes: Mutex::new(()),
        }
    }

    /// Admit a new rule, assigning an id if the draft carries none
    pub fn create(&self, draft: &RuleDraft) -> Result<Arc<AutomationRule>, LifecycleError> {
        let _writes = self.lock_writes()?;
        self.create_locked(draft)
    }

    /// Replace an existing rule's definition, keeping its cooldown clock
    pub fn update(&self, id: RuleId, draft: &RuleDraft) -> Result<Arc<AutomationRule>, LifecycleError> {
        let _writes = self.lock_writes()?;
        self.update_locked(id, draft)
    }

    /// Update when the draft names a known rule, otherwise create
    pub fn upsert(&self, draft: &RuleDraft) -> Result<Arc<AutomationRule>, LifecycleError> {
        let _writes = self.lock_writes()?;
        match draft.id {
            Some(id) if self.store.get(id).is_some() => self.update_locked(id, draft),
            _ => self.create_locked(draft),
        }
    }

    /// Delete a rule and its cooldown state
    pub fn remove(&self, id: RuleId) -> Result<Arc<AutomationRule>, LifecycleError> {
        let _writes = self.lock_writes()?;
        let removed = self.store.remove(id)?.ok_or(LifecycleError::NotFound(id))?;
        self.cooldowns.forget(id);
        info!("Removed {} '{}'", id, removed.name);
        Ok(removed)
    }

    /// Put a rule back on the evaluation path. Its cooldown clock is kept.
    pub fn activate(&self, id: RuleId) -> Result<Arc<AutomationRule>, LifecycleError> {
        let rule = self.store.set_active(id, true)?;
        info!("Activated {}", id);
        Ok(rule)
    }

    /// Take a rule off the evaluation path, retaining it
    pub fn deactivate(&self, id: RuleId) -> Result<Arc<AutomationRule>, LifecycleError> {
        let rule = self.store.set_active(id, false)?;
        info!("Deactivated {}", id);
        Ok(rule)
    }

    /// A rule with `last_fired_at` as the tracker currently sees it
    pub fn get(&self, id: RuleId) -> Option<AutomationRule> {
        self.store.get(id).map(|rule| self.with_last_fired(&rule))
    }

    /// All rules, sorted by id
    pub fn list(&self) -> Vec<AutomationRule> {
        self.store
            .all()
            .iter()
            .map(|rule| self.with_last_fired(rule))
            .collect()
    }

    /// Re-admit a persisted rule, preserving its `last_fired_at`
    pub fn restore(&self, rule: AutomationRule) -> Result<Arc<AutomationRule>, LifecycleError> {
        self.validator.validate_rule(&rule)?;
        let _writes = self.lock_writes()?;
        self.next_id.fetch_max(rule.id.0.saturating_add(1), Ordering::AcqRel);

        self.cooldowns.register(rule.id, rule.cooldown);
        if let Some(last_fired_at) = rule.last_fired_at {
            self.cooldowns.seed(rule.id, last_fired_at);
        }

        let rule = self.install(rule)?;
        debug!("Restored {}", rule.id);
        Ok(rule)
    }

    /// Clear a rule's `last_fired_at` so it may fire on the next matching reading
    pub fn reset_cooldown(&self, id: RuleId) -> Result<(), LifecycleError> {
        if self.store.get(id).is_none() || !self.cooldowns.reset(id) {
            return Err(LifecycleError::NotFound(id));
        }
        Ok(())
    }

    /// Admit a JSON array of drafts, one outcome per entry
    pub fn load_drafts(&self, json: &str) -> Result<Vec<DraftOutcome>, LifecycleError> {
        let drafts: Vec<RuleDraft> =
            serde_json::from_str(json).map_err(|e| LifecycleError::Malformed(e.to_string()))?;

        let outcomes: Vec<DraftOutcome> = drafts
            .iter()
            .enumerate()
            .map(|(index, draft)| DraftOutcome {
                index,
                name: draft.name.clone(),
                result: self.upsert(draft),
            })
            .collect();

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                warn!("Rejected rule #{} '{}': {}", outcome.index, outcome.name, e);
            }
        }
        let loaded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!("Loaded {}/{} rules", loaded, outcomes.len());
        Ok(outcomes)
    }

    /// Shared rule store
    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Shared cooldown tracker
    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, LifecycleError> {
        self.writes
            .lock()
            .map_err(|e| LifecycleError::Store(StoreError::LockPoisoned(e.to_string())))
    }

    fn create_locked(&self, draft: &RuleDraft) -> Result<Arc<AutomationRule>, LifecycleError> {
        let id = match draft.id {
            Some(id) if self.store.get(id).is_some() => {
                return Err(LifecycleError::AlreadyExists(id));
            }
            Some(id) => {
                self.next_id.fetch_max(id.0.saturating_add(1), Ordering::AcqRel);
                id
            }
            None => RuleId(self.next_id.fetch_add(1, Ordering::AcqRel)),
        };

        let rule = self.validator.admit(draft, id)?;
        let rule = self.install(rule)?;
        info!("Created {} '{}' ({})", rule.id, rule.name, rule.condition_summary());
        Ok(rule)
    }

    fn update_locked(&self, id: RuleId, draft: &RuleDraft) -> Result<Arc<AutomationRule>, LifecycleError> {
        if self.store.get(id).is_none() {
            return Err(LifecycleError::NotFound(id));
        }

        let rule = self.validator.admit(draft, id)?;
        let rule = self.install(rule)?;
        info!("Updated {} ({}, active={})", rule.id, rule.condition_summary(), rule.is_active);
        Ok(rule)
    }

    fn install(&self, mut rule: AutomationRule) -> Result<Arc<AutomationRule>, LifecycleError> {
        self.cooldowns.register(rule.id, rule.cooldown);
        rule.last_fired_at = None;
        let id = rule.id;
        self.store.upsert(rule)?;
        self.store.get(id).ok_or(LifecycleError::NotFound(id))
    }

    fn with_last_fired(&self, rule: &AutomationRule) -> AutomationRule {
        let mut rule = rule.clone();
        rule.last_fired_at = self.cooldowns.last_fired_at(rule.id);
        rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rule_model::{ActionSpec, DeploymentId};
    use rule_validator::{ActionDraft, ValidationError};
    use std::time::Duration;

    fn manager() -> LifecycleManager {
        LifecycleManager::new(
            Arc::new(RuleStore::new()),
            Arc::new(CooldownTracker::new()),
            Validator::default(),
        )
    }

    fn pump_draft() -> RuleDraft {
        RuleDraft {
            name: "Pump on when tank low".to_string(),
            sensor_deployment_id: Some(DeploymentId(4)),
            operator: "lt".to_string(),
            threshold_value: Some(30.0),
            action: ActionDraft::actuator(9, "ON"),
            is_active: true,
            cooldown_seconds: 300,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_assigns_ids_and_registers_cooldown() {
        let manager = manager();
        let first = manager.create(&pump_draft()).unwrap();
        let second = manager.create(&pump_draft()).unwrap();

        assert_eq!(first.id, RuleId(1));
        assert_eq!(second.id, RuleId(2));
        assert!(manager.cooldowns().contains(RuleId(1)));
        assert_eq!(manager.store().rules_watching(DeploymentId(4)).len(), 2);
    }

    #[test]
    fn test_explicit_id_advances_counter() {
        let manager = manager();
        let draft = RuleDraft {
            id: Some(RuleId(40)),
            ..pump_draft()
        };
        manager.create(&draft).unwrap();

        assert!(matches!(
            manager.create(&draft),
            Err(LifecycleError::AlreadyExists(RuleId(40)))
        ));
        assert_eq!(manager.create(&pump_draft()).unwrap().id, RuleId(41));
    }

    #[test]
    fn test_malformed_rule_never_stored() {
        let manager = manager();
        let mut draft = pump_draft();
        draft.action.target_deployment_id = None;

        assert!(matches!(
            manager.create(&draft),
            Err(LifecycleError::Invalid(ValidationError::MissingField("target_deployment_id")))
        ));
        assert!(manager.store().is_empty());
        assert!(manager.cooldowns().is_empty());
    }

    #[test]
    fn test_update_rekeys_and_keeps_cooldown_clock() {
        let manager = manager();
        let rule = manager.create(&pump_draft()).unwrap();
        let fired_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert!(manager.cooldowns().try_acquire(rule.id, fired_at));

        let draft = RuleDraft {
            sensor_deployment_id: Some(DeploymentId(5)),
            cooldown_seconds: 600,
            ..pump_draft()
        };
        let updated = manager.update(rule.id, &draft).unwrap();

        assert_eq!(updated.cooldown, Duration::from_secs(600));
        assert!(manager.store().rules_watching(DeploymentId(4)).is_empty());
        assert_eq!(manager.store().rules_watching(DeploymentId(5)).len(), 1);
        assert_eq!(manager.get(rule.id).unwrap().last_fired_at, Some(fired_at));
    }

    #[test]
    fn test_update_unknown_rule() {
        assert!(matches!(
            manager().update(RuleId(9), &pump_draft()),
            Err(LifecycleError::NotFound(RuleId(9)))
        ));
    }

    #[test]
    fn test_upsert_switches_on_known_id() {
        let manager = manager();
        let created = manager.upsert(&pump_draft()).unwrap();

        let draft = RuleDraft {
            id: Some(created.id),
            threshold_value: Some(25.0),
            ..pump_draft()
        };
        let updated = manager.upsert(&draft).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.threshold_value, 25.0);
        assert_eq!(manager.store().len(), 1);
    }

    #[test]
    fn test_activate_and_deactivate() {
        let manager = manager();
        let rule = manager.create(&pump_draft()).unwrap();

        manager.deactivate(rule.id).unwrap();
        assert!(manager.store().rules_watching(DeploymentId(4)).is_empty());
        assert!(!manager.get(rule.id).unwrap().is_active);

        manager.activate(rule.id).unwrap();
        assert_eq!(manager.store().rules_watching(DeploymentId(4)).len(), 1);
        assert!(matches!(manager.activate(RuleId(77)), Err(LifecycleError::NotFound(_))));
    }

    #[test]
    fn test_remove_forgets_cooldown() {
        let manager = manager();
        let rule = manager.create(&pump_draft()).unwrap();

        manager.remove(rule.id).unwrap();
        assert!(manager.get(rule.id).is_none());
        assert!(!manager.cooldowns().contains(rule.id));
        assert!(matches!(manager.remove(rule.id), Err(LifecycleError::NotFound(_))));
    }

    #[test]
    fn test_restore_preserves_last_fired() {
        let manager = manager();
        let fired_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut rule = manager.validator.admit(&pump_draft(), RuleId(12)).unwrap();
        rule.last_fired_at = Some(fired_at);

        manager.restore(rule).unwrap();
        assert_eq!(manager.get(RuleId(12)).unwrap().last_fired_at, Some(fired_at));
        assert!(!manager
            .cooldowns()
            .try_acquire(RuleId(12), fired_at + chrono::Duration::minutes(1)));
        assert_eq!(manager.create(&pump_draft()).unwrap().id, RuleId(13));
    }

    #[test]
    fn test_reset_cooldown() {
        let manager = manager();
        let rule = manager.create(&pump_draft()).unwrap();
        let fired_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert!(manager.cooldowns().try_acquire(rule.id, fired_at));

        manager.reset_cooldown(rule.id).unwrap();
        assert!(manager.get(rule.id).unwrap().last_fired_at.is_none());
        assert!(manager.cooldowns().try_acquire(rule.id, fired_at));
        assert!(matches!(manager.reset_cooldown(RuleId(99)), Err(LifecycleError::NotFound(_))));
    }

    #[test]
    fn test_load_drafts_reports_each_entry() {
        let manager = manager();
        let json = r#"[
            {"name": "Dim light", "sensor_deployment_id": 7, "operator": "<",
             "threshold_value": 200, "action_type": "actuator",
             "target_deployment_id": 11, "actuator_command": "ON", "cooldown_seconds": 300},
            {"name": "Motion", "sensor_deployment_id": 3, "operator": "==",
             "threshold_value": 1, "action_type": "alert", "alert_title": "Motion",
             "alert_severity": "critical"},
            {"name": "Broken", "sensor_deployment_id": 3, "operator": "about",
             "threshold_value": 1, "action_type": "alert", "alert_title": "x",
             "alert_severity": "info"}
        ]"#;

        let outcomes = manager.load_drafts(json).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result.as_ref().map(|r| &r.action),
            Ok(ActionSpec::CreateAlert { .. })
        ));
        assert!(matches!(outcomes[2].result, Err(LifecycleError::Invalid(_))));
        assert_eq!(manager.store().len(), 2);
    }

    #[test]
    fn test_load_drafts_rejects_bad_document() {
        assert!(matches!(
            manager().load_drafts("{not json"),
            Err(LifecycleError::Malformed(_))
        ));
    }

    #[test]
    fn test_update_racing_remove_leaves_no_orphan() {
        for _ in 0..200 {
            let manager = manager();
            let rule = manager.create(&pump_draft()).unwrap();
            let draft = RuleDraft {
                cooldown_seconds: 60,
                ..pump_draft()
            };

            std::thread::scope(|s| {
                s.spawn(|| {
                    let _ = manager.update(rule.id, &draft);
                });
                s.spawn(|| {
                    let _ = manager.remove(rule.id);
                });
            });

            assert!(manager.get(rule.id).is_none());
            assert!(!manager.cooldowns().contains(rule.id));
        }
    }

    #[test]
    fn test_concurrent_create_same_id_admits_one() {
        for _ in 0..200 {
            let manager = manager();
            let draft = RuleDraft {
                id: Some(RuleId(7)),
                ..pump_draft()
            };

            let results: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..2).map(|_| s.spawn(|| manager.create(&draft))).collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(LifecycleError::AlreadyExists(RuleId(7))))));
            assert_eq!(manager.store().len(), 1);
        }
    }
}
