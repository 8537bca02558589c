//! Cooldown Tracker Implementation

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rule_model::RuleId;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::snapshot::{CooldownSnapshot, SnapshotEntry};

/// Sentinel for "never fired"
const NEVER: i64 = i64::MIN;

/// Cooldown state of one rule
#[derive(Debug)]
struct CooldownSlot {
    /// Minimum spacing between firings (milliseconds)
    cooldown_ms: AtomicU64,
    /// Last firing time (unix milliseconds) or `NEVER`
    last_fired_ms: AtomicI64,
}

impl CooldownSlot {
    fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms: AtomicU64::new(cooldown_ms),
            last_fired_ms: AtomicI64::new(NEVER),
        }
    }

    fn cooldown_ms(&self) -> i64 {
        i64::try_from(self.cooldown_ms.load(Ordering::Acquire)).unwrap_or(i64::MAX)
    }
}

/// Per-rule last-fired store with compare-and-swap admission.
///
/// Slots live in a sharded map keyed by rule id; the firing decision itself
/// is a CAS on the slot's timestamp, so no lock is held while deciding.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    slots: DashMap<RuleId, Arc<CooldownSlot>>,
}

impl CooldownTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule or update its cooldown.
    ///
    /// An existing `last_fired_at` is kept, so editing or reactivating a
    /// rule does not reset its cooldown clock.
    pub fn register(&self, rule_id: RuleId, cooldown: Duration) {
        let cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
        self.slots
            .entry(rule_id)
            .or_insert_with(|| Arc::new(CooldownSlot::new(cooldown_ms)))
            .cooldown_ms
            .store(cooldown_ms, Ordering::Release);
        debug!("Cooldown for {} set to {}ms", rule_id, cooldown_ms);
    }

    /// Seed the last firing time of a registered rule. Never moves it backwards.
    pub fn seed(&self, rule_id: RuleId, last_fired_at: DateTime<Utc>) -> bool {
        match self.slot(rule_id) {
            Some(slot) => {
                slot.last_fired_ms
                    .fetch_max(last_fired_at.timestamp_millis(), Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Drop a rule's slot
    pub fn forget(&self, rule_id: RuleId) -> bool {
        self.slots.remove(&rule_id).is_some()
    }

    /// Clear a rule's last firing time so it may fire immediately
    pub fn reset(&self, rule_id: RuleId) -> bool {
        match self.slot(rule_id) {
            Some(slot) => {
                slot.last_fired_ms.store(NEVER, Ordering::Release);
                info!("Cooldown reset for {}", rule_id);
                true
            }
            None => false,
        }
    }

    /// Try to claim the right to fire `rule_id` at `now`.
    ///
    /// Returns true and records `now` as the last firing time iff the rule
    /// never fired or `now - last_fired_at >= cooldown`. Among concurrent
    /// callers at most one succeeds per window. Unregistered rules never fire.
    pub fn try_acquire(&self, rule_id: RuleId, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.slot(rule_id) else {
            warn!("Cooldown check for unregistered {}", rule_id);
            return false;
        };

        let now_ms = now.timestamp_millis();
        let cooldown_ms = slot.cooldown_ms();
        let mut last = slot.last_fired_ms.load(Ordering::Acquire);

        loop {
            if last != NEVER && now_ms.saturating_sub(last) < cooldown_ms {
                return false;
            }

            match slot.last_fired_ms.compare_exchange_weak(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }

    /// Time left before `rule_id` may fire again, `ZERO` if eligible now
    pub fn remaining(&self, rule_id: RuleId, now: DateTime<Utc>) -> Option<Duration> {
        let slot = self.slot(rule_id)?;
        let last = slot.last_fired_ms.load(Ordering::Acquire);
        if last == NEVER {
            return Some(Duration::ZERO);
        }

        let elapsed = now.timestamp_millis().saturating_sub(last);
        let left = slot.cooldown_ms().saturating_sub(elapsed).max(0);
        Some(Duration::from_millis(left as u64))
    }

    /// Last firing time of `rule_id`
    pub fn last_fired_at(&self, rule_id: RuleId) -> Option<DateTime<Utc>> {
        let last = self.slot(rule_id)?.last_fired_ms.load(Ordering::Acquire);
        if last == NEVER {
            None
        } else {
            DateTime::<Utc>::from_timestamp_millis(last)
        }
    }

    /// Whether a slot exists for `rule_id`
    pub fn contains(&self, rule_id: RuleId) -> bool {
        self.slots.contains_key(&rule_id)
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no rule is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Export the last firing time of every rule that has fired
    pub fn snapshot(&self) -> CooldownSnapshot {
        let mut entries: Vec<SnapshotEntry> = self
            .slots
            .iter()
            .filter_map(|slot| {
                let last = slot.value().last_fired_ms.load(Ordering::Acquire);
                (last != NEVER).then_some(SnapshotEntry {
                    rule_id: *slot.key(),
                    last_fired_ms: last,
                })
            })
            .collect();
        entries.sort_by_key(|e| e.rule_id);
        CooldownSnapshot { entries }
    }

    /// Seed registered rules from a snapshot; returns how many were seeded
    pub fn restore(&self, snapshot: &CooldownSnapshot) -> usize {
        let mut seeded = 0;
        for entry in &snapshot.entries {
            match self.slot(entry.rule_id) {
                Some(slot) => {
                    slot.last_fired_ms.fetch_max(entry.last_fired_ms, Ordering::AcqRel);
                    seeded += 1;
                }
                None => debug!("Skipping snapshot entry for unknown {}", entry.rule_id),
            }
        }
        info!("Restored cooldown state for {} rules", seeded);
        seeded
    }

    fn slot(&self, rule_id: RuleId) -> Option<Arc<CooldownSlot>> {
        self.slots.get(&rule_id).map(|slot| Arc::clone(slot.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    #[test]
    fn test_first_acquire_succeeds() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));
        assert!(tracker.try_acquire(RuleId(1), t(0)));
        assert_eq!(tracker.last_fired_at(RuleId(1)), Some(t(0)));
    }

    #[test]
    fn test_cooldown_window() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));

        let fired: Vec<i64> = [0, 1, 4, 6]
            .into_iter()
            .filter(|m| tracker.try_acquire(RuleId(1), t(*m)))
            .collect();
        assert_eq!(fired, vec![0, 6]);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));
        assert!(tracker.try_acquire(RuleId(1), t(0)));
        assert!(tracker.try_acquire(RuleId(1), t(5)));
    }

    #[test]
    fn test_zero_cooldown_fires_every_time() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::ZERO);
        assert!(tracker.try_acquire(RuleId(1), t(0)));
        assert!(tracker.try_acquire(RuleId(1), t(0)));
        assert!(tracker.try_acquire(RuleId(1), t(1)));
        // An older reading never moves the clock backwards
        assert!(!tracker.try_acquire(RuleId(1), t(-1)));
        assert_eq!(tracker.last_fired_at(RuleId(1)), Some(t(1)));
    }

    #[test]
    fn test_unregistered_rule_never_fires() {
        let tracker = CooldownTracker::new();
        assert!(!tracker.try_acquire(RuleId(42), t(0)));
        assert!(tracker.remaining(RuleId(42), t(0)).is_none());
    }

    #[test]
    fn test_register_keeps_last_fired() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));
        assert!(tracker.try_acquire(RuleId(1), t(0)));

        tracker.register(RuleId(1), Duration::from_secs(600));
        assert!(!tracker.try_acquire(RuleId(1), t(6)));
        assert!(tracker.try_acquire(RuleId(1), t(10)));
    }

    #[test]
    fn test_reset_and_forget() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));
        assert!(tracker.try_acquire(RuleId(1), t(0)));
        assert!(tracker.reset(RuleId(1)));
        assert!(tracker.try_acquire(RuleId(1), t(1)));

        assert!(tracker.forget(RuleId(1)));
        assert!(!tracker.contains(RuleId(1)));
        assert!(!tracker.reset(RuleId(1)));
    }

    #[test]
    fn test_remaining() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));
        assert_eq!(tracker.remaining(RuleId(1), t(0)), Some(Duration::ZERO));

        tracker.try_acquire(RuleId(1), t(0));
        assert_eq!(tracker.remaining(RuleId(1), t(1)), Some(Duration::from_secs(240)));
        assert_eq!(tracker.remaining(RuleId(1), t(9)), Some(Duration::ZERO));
    }

    #[test]
    fn test_concurrent_acquire_admits_one() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));

        let granted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let tracker = &tracker;
                    scope.spawn(move || {
                        tracker.try_acquire(RuleId(1), t(0) + chrono::Duration::milliseconds(i))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|granted| *granted)
                .count()
        });

        assert_eq!(granted, 1);
    }

    #[test]
    fn test_seed_never_moves_backwards() {
        let tracker = CooldownTracker::new();
        tracker.register(RuleId(1), Duration::from_secs(300));
        assert!(tracker.seed(RuleId(1), t(10)));
        assert!(tracker.seed(RuleId(1), t(2)));
        assert_eq!(tracker.last_fired_at(RuleId(1)), Some(t(10)));
        assert!(!tracker.seed(RuleId(9), t(0)));
    }

    proptest! {
        #[test]
        fn prop_firings_respect_spacing(
            cooldown_s in 0u64..600,
            mut offsets in proptest::collection::vec(0i64..10_000, 1..50),
        ) {
            offsets.sort_unstable();
            let tracker = CooldownTracker::new();
            tracker.register(RuleId(1), Duration::from_secs(cooldown_s));

            let base = t(0);
            let fired: Vec<i64> = offsets
                .iter()
                .copied()
                .filter(|s| tracker.try_acquire(RuleId(1), base + chrono::Duration::seconds(*s)))
                .collect();

            prop_assert_eq!(fired.first().copied(), offsets.first().copied());
            for pair in fired.windows(2) {
                prop_assert!(pair[1] - pair[0] >= cooldown_s as i64);
            }
        }
    }
}
