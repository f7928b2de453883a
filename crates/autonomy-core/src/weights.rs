//! Hybrid Weight Manager (§4.E).
//!
//! Operator weights are ground truth; this component layers named,
//! time-bounded adjustments on top rather than overwriting them. Guarded
//! by a single mutex covering both maps (§5); expiry eviction runs lazily
//! on every read, never on a background timer.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::config::WeightPolicy;
use crate::model::{AdjustmentType, Class, WeightAdjustment};

struct Inner {
    original: HashMap<String, i32>,
    effective: HashMap<String, i32>,
    adjustments: HashMap<String, WeightAdjustment>,
}

pub struct HybridWeightManager {
    inner: Mutex<Inner>,
    policy: WeightPolicy,
}

impl HybridWeightManager {
    pub fn new(policy: WeightPolicy) -> Self {
        HybridWeightManager {
            inner: Mutex::new(Inner {
                original: HashMap::new(),
                effective: HashMap::new(),
                adjustments: HashMap::new(),
            }),
            policy,
        }
    }

    /// `load_originals()` — read all `weight` entries from the host router
    /// config; populate `original` and `effective`.
    pub fn load_originals(&self, weights: HashMap<String, i32>) {
        let mut inner = self.inner.lock().unwrap();
        inner.effective = weights.clone();
        inner.original = weights;
        inner.adjustments.clear();
    }

    fn evict_expired_locked(inner: &mut Inner, now: DateTime<Utc>) {
        let expired: Vec<String> = inner
            .adjustments
            .iter()
            .filter(|(_, adj)| adj.is_expired(now))
            .map(|(name, _)| name.clone())
            .collect();
        for name in expired {
            inner.adjustments.remove(&name);
            if let Some(&orig) = inner.original.get(&name) {
                inner.effective.insert(name, orig);
            }
        }
    }

    /// `effective_weight(name)` — after lazy eviction of expired
    /// adjustments, returns `effective[name]` if present, else a
    /// class-based fallback.
    pub fn effective_weight(&self, name: &str, class: Class) -> i32 {
        if !self.policy.respect_user_weights {
            return class.fallback_weight();
        }
        let mut inner = self.inner.lock().unwrap();
        Self::evict_expired_locked(&mut inner, Utc::now());
        inner
            .effective
            .get(name)
            .copied()
            .unwrap_or_else(|| class.fallback_weight())
    }

    /// `apply(name, new_weight, reason, type, duration)`.
    ///
    /// Rejected (no-op) when the adjustment type is gated off by policy.
    /// A new adjustment supersedes any prior one for the same member.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        name: &str,
        class: Class,
        new_weight: i32,
        reason: impl Into<String>,
        kind: AdjustmentType,
        duration: chrono::Duration,
    ) -> bool {
        match kind {
            AdjustmentType::Boost | AdjustmentType::Penalty => {
                if !self.policy.dynamic_adjustment || self.policy.only_emergency_override {
                    return false;
                }
            }
            AdjustmentType::Emergency => {
                if !self.policy.emergency_override {
                    return false;
                }
            }
        }

        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        Self::evict_expired_locked(&mut inner, now);

        let original = *inner
            .original
            .entry(name.to_string())
            .or_insert_with(|| class.fallback_weight());

        inner.effective.insert(name.to_string(), new_weight);
        inner.adjustments.insert(
            name.to_string(),
            WeightAdjustment {
                member_name: name.to_string(),
                original_weight: original,
                adjusted_weight: new_weight,
                reason: reason.into(),
                applied_at: now,
                expires_at: now + duration,
                kind,
            },
        );
        true
    }

    /// `restore(name)` — drop any adjustment and restore `effective[name]
    /// = original[name]`.
    pub fn restore(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.adjustments.remove(name);
        if let Some(&orig) = inner.original.get(name) {
            inner.effective.insert(name.to_string(), orig);
        }
    }

    /// `restore_all()` — drop every adjustment.
    pub fn restore_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        let names: Vec<String> = inner.adjustments.keys().cloned().collect();
        inner.adjustments.clear();
        for name in names {
            if let Some(&orig) = inner.original.get(&name) {
                inner.effective.insert(name, orig);
            }
        }
    }

    /// Current adjustment for a member, after lazy eviction, if any.
    pub fn adjustment(&self, name: &str) -> Option<WeightAdjustment> {
        let mut inner = self.inner.lock().unwrap();
        Self::evict_expired_locked(&mut inner, Utc::now());
        inner.adjustments.get(name).cloned()
    }

    pub fn policy(&self) -> WeightPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, i32)]) -> HashMap<String, i32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weight_fidelity_with_no_adjustment() {
        let mgr = HybridWeightManager::new(WeightPolicy::default());
        mgr.load_originals(weights(&[("starlink", 100), ("cell1", 85)]));
        assert_eq!(mgr.effective_weight("starlink", Class::Starlink), 100);
        assert_eq!(mgr.effective_weight("cell1", Class::Cellular), 85);
    }

    #[test]
    fn adjustment_expires_and_restores() {
        let mgr = HybridWeightManager::new(WeightPolicy::default());
        mgr.load_originals(weights(&[("starlink", 100)]));
        mgr.apply(
            "starlink",
            Class::Starlink,
            80,
            "obstruction",
            AdjustmentType::Penalty,
            chrono::Duration::seconds(-1), // already expired
        );
        // Lazy eviction happens on the next read.
        assert_eq!(mgr.effective_weight("starlink", Class::Starlink), 100);
        assert!(mgr.adjustment("starlink").is_none());
    }

    #[test]
    fn supersession_keeps_exactly_one_adjustment() {
        let mgr = HybridWeightManager::new(WeightPolicy::default());
        mgr.load_originals(weights(&[("cell1", 85)]));
        mgr.apply(
            "cell1",
            Class::Cellular,
            95,
            "boost-1",
            AdjustmentType::Boost,
            chrono::Duration::seconds(60),
        );
        mgr.apply(
            "cell1",
            Class::Cellular,
            70,
            "penalty-1",
            AdjustmentType::Penalty,
            chrono::Duration::seconds(60),
        );
        let adj = mgr.adjustment("cell1").unwrap();
        assert_eq!(adj.reason, "penalty-1");
        assert_eq!(mgr.effective_weight("cell1", Class::Cellular), 70);
    }

    #[test]
    fn policy_gates_block_disallowed_adjustments() {
        let mut policy = WeightPolicy::default();
        policy.dynamic_adjustment = false;
        let mgr = HybridWeightManager::new(policy);
        mgr.load_originals(weights(&[("cell1", 85)]));
        let applied = mgr.apply(
            "cell1",
            Class::Cellular,
            95,
            "boost",
            AdjustmentType::Boost,
            chrono::Duration::seconds(60),
        );
        assert!(!applied);
        assert_eq!(mgr.effective_weight("cell1", Class::Cellular), 85);

        let mut policy2 = WeightPolicy::default();
        policy2.emergency_override = false;
        let mgr2 = HybridWeightManager::new(policy2);
        mgr2.load_originals(weights(&[("cell2", 84)]));
        let applied2 = mgr2.apply(
            "cell2",
            Class::Cellular,
            100,
            "emergency",
            AdjustmentType::Emergency,
            chrono::Duration::seconds(60),
        );
        assert!(!applied2);
    }

    #[test]
    fn restore_all_clears_every_adjustment() {
        let mgr = HybridWeightManager::new(WeightPolicy::default());
        mgr.load_originals(weights(&[("a", 10), ("b", 20)]));
        mgr.apply(
            "a",
            Class::Other,
            5,
            "x",
            AdjustmentType::Penalty,
            chrono::Duration::seconds(60),
        );
        mgr.apply(
            "b",
            Class::Other,
            30,
            "y",
            AdjustmentType::Boost,
            chrono::Duration::seconds(60),
        );
        mgr.restore_all();
        assert_eq!(mgr.effective_weight("a", Class::Other), 10);
        assert_eq!(mgr.effective_weight("b", Class::Other), 20);
    }

    #[test]
    fn inert_when_respect_user_weights_disabled() {
        let mut policy = WeightPolicy::default();
        policy.respect_user_weights = false;
        let mgr = HybridWeightManager::new(policy);
        mgr.load_originals(weights(&[("starlink", 100)]));
        assert_eq!(
            mgr.effective_weight("starlink", Class::Starlink),
            Class::Starlink.fallback_weight()
        );
    }
}
