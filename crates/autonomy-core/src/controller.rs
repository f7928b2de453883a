//! Controller / Executor (§4.H): applies the Decision Engine's choice to
//! the host's policy-routing layer, enforcing cooldown and minimum-uptime
//! guarantees. Holds the one piece of state that must never race — the
//! currently active member — behind a single mutex, so no two `switch`
//! calls are ever in flight (§5).

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::ControllerError;
use crate::host::RoutingControl;
use crate::model::{AdjustmentType, Decision, Member};
use crate::store::TelemetryStore;
use crate::weights::HybridWeightManager;

struct Inner {
    current: Option<String>,
    last_switch_at: Option<DateTime<Utc>>,
}

pub struct Controller {
    cooldown_s: u64,
    min_uptime_s: u64,
    inner: Mutex<Inner>,
}

impl Controller {
    pub fn new(cooldown_s: u64, min_uptime_s: u64, current: Option<String>) -> Self {
        Controller {
            cooldown_s,
            min_uptime_s,
            inner: Mutex::new(Inner {
                current,
                last_switch_at: None,
            }),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Apply a decision. Idempotent when the chosen member is already
    /// active (§8 "Round-trip" property) — no routing mutation is
    /// issued. A predictive decision bypasses cooldown and min-uptime:
    /// an active or imminent failure outranks the guardrails that exist
    /// only to damp routine hysteresis.
    pub fn apply(
        &self,
        decision: &Decision,
        candidate: &Member,
        routing: &dyn RoutingControl,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.current.as_deref() == Some(decision.chosen_member.as_str()) {
            return Ok(());
        }

        if !decision.predictive {
            if let Some(last) = inner.last_switch_at {
                let elapsed = (now - last).num_seconds().max(0) as u64;
                if elapsed < self.cooldown_s {
                    return Err(ControllerError::Cooldown {
                        from: inner.current.clone().unwrap_or_default(),
                        to: decision.chosen_member.clone(),
                        remaining_s: self.cooldown_s - elapsed,
                    });
                }
            }

            if let Some(uptime) = candidate.uptime_s(now) {
                if (uptime as u64) < self.min_uptime_s {
                    return Err(ControllerError::MinUptimeNotMet {
                        to: decision.chosen_member.clone(),
                    });
                }
            }
        }

        let from = inner.current.clone();
        routing
            .switch(from.as_deref(), &decision.chosen_member)
            .map_err(|source| ControllerError::HostRejected {
                from: from.clone().unwrap_or_default(),
                to: decision.chosen_member.clone(),
                source,
            })?;

        inner.current = Some(decision.chosen_member.clone());
        inner.last_switch_at = Some(now);
        Ok(())
    }

    /// §7 "Controller errors": a switch that fails at the host layer is
    /// logged as an event by the caller and the target is penalized here
    /// so the Decision Engine does not immediately re-attempt the same
    /// switch on the next tick.
    pub fn penalize_failed_switch(
        &self,
        target: &Member,
        weights: &HybridWeightManager,
        emergency_duration_s: u64,
    ) {
        weights.apply(
            &target.name,
            target.class,
            (target.effective_weight / 4).max(0),
            "switch_failed",
            AdjustmentType::Emergency,
            chrono::Duration::seconds(emergency_duration_s as i64),
        );
    }

    pub fn record_switch_event(&self, store: &TelemetryStore, decision: &Decision) {
        store.record_event(
            "switch",
            serde_json::json!({
                "chosen_member": decision.chosen_member,
                "reason": decision.reason,
                "predecessor": decision.predecessor,
                "predictive": decision.predictive,
            }),
        );
    }
}
