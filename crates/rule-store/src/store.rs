//! Rule Store Implementation

use crate::StoreError;
use dashmap::DashMap;
use rule_model::{AutomationRule, DeploymentId, RuleId};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Immutable snapshot of the active rules watching one deployment
pub type WatchList = Arc<[Arc<AutomationRule>]>;

/// In-memory rule index.
///
/// Readers never lock: each watch-list is copy-on-write and replaced whole,
/// so a lookup sees either the list before a mutation or the list after it.
/// Mutations are serialized by a single writer lock.
pub struct RuleStore {
    /// All rules, active or not
    rules: DashMap<RuleId, Arc<AutomationRule>>,
    /// Active rules by watched deployment, sorted by rule id
    watch: DashMap<DeploymentId, WatchList>,
    /// Serializes mutations
    writer: Mutex<()>,
    /// Shared empty list for unwatched deployments
    empty: WatchList,
}

impl RuleStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Creating in-memory rule store");
        Self {
            rules: DashMap::new(),
            watch: DashMap::new(),
            writer: Mutex::new(()),
            empty: Arc::from(Vec::new()),
        }
    }

    /// Active rules watching `deployment`
    pub fn rules_watching(&self, deployment: DeploymentId) -> WatchList {
        self.watch
            .get(&deployment)
            .map(|list| Arc::clone(list.value()))
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    /// Insert or replace a rule, re-keying its watch-list entry.
    ///
    /// Returns the previous version, if any.
    pub fn upsert(&self, rule: AutomationRule) -> Result<Option<Arc<AutomationRule>>, StoreError> {
        let _guard = self.lock()?;
        Ok(self.replace(Arc::new(rule)))
    }

    /// Modify a stored rule in place
    pub fn update<F>(&self, rule_id: RuleId, f: F) -> Result<Arc<AutomationRule>, StoreError>
    where
        F: FnOnce(&mut AutomationRule),
    {
        let _guard = self.lock()?;
        let mut rule = self
            .get(rule_id)
            .map(|current| (*current).clone())
            .ok_or(StoreError::NotFound(rule_id))?;
        f(&mut rule);
        rule.id = rule_id;

        let rule = Arc::new(rule);
        self.replace(Arc::clone(&rule));
        Ok(rule)
    }

    /// Activate or deactivate a rule
    pub fn set_active(&self, rule_id: RuleId, active: bool) -> Result<Arc<AutomationRule>, StoreError> {
        self.update(rule_id, |rule| rule.is_active = active)
    }

    /// Remove a rule entirely
    pub fn remove(&self, rule_id: RuleId) -> Result<Option<Arc<AutomationRule>>, StoreError> {
        let _guard = self.lock()?;
        let removed = self.rules.remove(&rule_id).map(|(_, rule)| rule);
        if let Some(rule) = &removed {
            if rule.is_active {
                self.unwatch(rule.sensor_deployment_id, rule.id);
            }
            debug!("Removed {} from store", rule_id);
        }
        Ok(removed)
    }

    /// Get a rule by id
    pub fn get(&self, rule_id: RuleId) -> Option<Arc<AutomationRule>> {
        self.rules.get(&rule_id).map(|rule| Arc::clone(rule.value()))
    }

    /// All rules, sorted by id
    pub fn all(&self) -> Vec<Arc<AutomationRule>> {
        let mut rules: Vec<_> = self.rules.iter().map(|r| Arc::clone(r.value())).collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    /// Total rule count
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the store holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Count of active rules
    pub fn active_count(&self) -> usize {
        self.watch.iter().map(|list| list.value().len()).sum()
    }

    /// Count of deployments with at least one watching rule
    pub fn watched_deployments(&self) -> usize {
        self.watch.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.writer
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Swap in a new rule version. Caller holds the writer lock.
    fn replace(&self, rule: Arc<AutomationRule>) -> Option<Arc<AutomationRule>> {
        let previous = self.rules.insert(rule.id, Arc::clone(&rule));

        if let Some(prev) = &previous {
            let same_list = prev.sensor_deployment_id == rule.sensor_deployment_id;
            if prev.is_active && !(same_list && rule.is_active) {
                self.unwatch(prev.sensor_deployment_id, prev.id);
            }
        }
        if rule.is_active {
            self.watch(&rule);
        }

        debug!(
            "Stored {} ({}, active={})",
            rule.id,
            rule.condition_summary(),
            rule.is_active
        );
        previous
    }

    fn watch(&self, rule: &Arc<AutomationRule>) {
        let deployment = rule.sensor_deployment_id;
        let mut list: Vec<Arc<AutomationRule>> = self
            .rules_watching(deployment)
            .iter()
            .filter(|r| r.id != rule.id)
            .cloned()
            .collect();
        list.push(Arc::clone(rule));
        list.sort_by_key(|r| r.id);
        self.watch.insert(deployment, Arc::from(list));
    }

    fn unwatch(&self, deployment: DeploymentId, rule_id: RuleId) {
        let list: Vec<Arc<AutomationRule>> = self
            .rules_watching(deployment)
            .iter()
            .filter(|r| r.id != rule_id)
            .cloned()
            .collect();

        if list.is_empty() {
            self.watch.remove(&deployment);
        } else {
            self.watch.insert(deployment, Arc::from(list));
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}
