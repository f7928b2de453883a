//! Decision Engine (§4.F): scores members, applies hysteresis, evaluates
//! predictive triggers, and selects the member that should be active.
//!
//! `decide(now)` is a function of the Store snapshot and the Hybrid
//! Weight Manager snapshot plus operator thresholds; the only state this
//! engine keeps across calls is the per-member trend trackers (needed
//! for predictive triggers) and the hysteresis flag used for
//! restoration, both scoped by member name so they survive a member
//! briefly disappearing and reappearing.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::config::{IntelligenceThresholds, Thresholds};
use crate::model::{
    AdjustmentType, Class, DataLimitStatus, Decision, EventSeverity, Member, Sample,
};
use crate::store::TelemetryStore;
use crate::trend::{TrendConfig, TrendFilter};
use crate::weights::HybridWeightManager;

/// How aggressively traffic should avoid data-capped members. Normal
/// traffic avoids anything `warning` or worse; emergency selection (no
/// other member viable) only avoids `exceeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Emergency,
}

struct Trackers {
    obstruction: TrendFilter,
    snr: TrendFilter,
    rsrp: TrendFilter,
    sinr: TrendFilter,
}

impl Default for Trackers {
    fn default() -> Self {
        Trackers {
            obstruction: TrendFilter::new(&TrendConfig::for_percentage()),
            snr: TrendFilter::new(&TrendConfig::for_signal()),
            rsrp: TrendFilter::new(&TrendConfig::for_signal()),
            sinr: TrendFilter::new(&TrendConfig::for_signal()),
        }
    }
}

#[derive(Default, Clone, Copy)]
struct Hysteresis {
    /// Set once a member breaches the failover floor; cleared only after
    /// it has held under the (stricter) restore floor for
    /// `restore.min_duration_s`. A member that has never degraded is
    /// always a usable candidate — this is what lets ordinary failover
    /// between two already-healthy members happen immediately, without
    /// waiting out a restore window that only applies to members
    /// recovering from a prior failure.
    degraded: bool,
    good_since: Option<DateTime<Utc>>,
}

pub struct DecisionEngine {
    thresholds: Thresholds,
    trackers: Mutex<HashMap<String, Trackers>>,
    hysteresis: Mutex<HashMap<String, Hysteresis>>,
}

impl DecisionEngine {
    /// Approximate seconds between collector ticks, used only to turn a
    /// per-tick trend velocity into a seconds-denominated estimate. Matches
    /// the same approximation `predictive_trigger`'s sustained-loss check
    /// already makes.
    const TICK_S: f64 = 5.0;

    pub fn new(thresholds: Thresholds) -> Self {
        DecisionEngine {
            thresholds,
            trackers: Mutex::new(HashMap::new()),
            hysteresis: Mutex::new(HashMap::new()),
        }
    }

    fn update_trackers(&self, member_name: &str, sample: &Sample) {
        let mut trackers = self.trackers.lock().unwrap();
        let t = trackers.entry(member_name.to_string()).or_default();
        if let Some(sl) = &sample.starlink {
            if let Some(o) = sl.obstruction_pct {
                t.obstruction.update(o);
            }
            if let Some(s) = sl.snr {
                t.snr.update(s);
            }
        }
        if let Some(c) = &sample.cellular {
            if let Some(r) = c.rsrp {
                t.rsrp.update(r);
            }
            if let Some(s) = c.sinr {
                t.sinr.update(s);
            }
        }
    }

    /// Per-class reactive score in `[0, 100]`, higher is better.
    fn reactive_score(member: &Member, sample: &Sample, intel: &IntelligenceThresholds) -> f64 {
        let mut score: f64 = 100.0;

        if let Some(g) = &sample.generic {
            if let Some(latency) = g.latency_ms {
                score -= ((latency - 50.0) / 10.0).max(0.0).min(40.0);
            }
            if let Some(loss) = g.loss_pct {
                score -= (loss * 3.0).min(40.0);
            }
            if let Some(jitter) = g.jitter_ms {
                score -= (jitter / 5.0).min(15.0);
            }
        }

        match member.class {
            Class::Starlink => {
                if let Some(sl) = &sample.starlink {
                    if let Some(obstruction) = sl.obstruction_pct {
                        score -= obstruction * 2.5;
                    }
                    score -= (10.0 * sl.outages as f64).min(30.0);
                    let event_penalty: f64 = sl
                        .events
                        .iter()
                        .map(|e| match e.severity {
                            EventSeverity::Critical => 8.0,
                            EventSeverity::Warning => 3.0,
                            EventSeverity::Info => 1.0,
                        })
                        .sum::<f64>()
                        .min(20.0);
                    score -= event_penalty;
                }
            }
            Class::Cellular => {
                if let Some(c) = &sample.cellular {
                    if let Some(rsrp) = c.rsrp {
                        if rsrp < intel.cellular_signal_threshold {
                            score -= (intel.cellular_signal_threshold - rsrp) * 1.5;
                        }
                    }
                    if c.roaming && !member.prefer_roaming {
                        score -= 15.0;
                    }
                    if let Some(stability) = c.stability_score {
                        score -= (100.0 - stability) * 0.3;
                    }
                }
                if let Some(limit) = &member.data_limit {
                    score -= match limit.status() {
                        DataLimitStatus::Warning => 10.0,
                        DataLimitStatus::Critical => 30.0,
                        DataLimitStatus::Exceeded => 60.0,
                        DataLimitStatus::Ok | DataLimitStatus::Disabled => 0.0,
                    };
                }
            }
            Class::Wifi => {
                if let Some(w) = &sample.wifi {
                    if let Some(signal) = w.signal_strength {
                        if signal < -70.0 {
                            score -= (-70.0 - signal) * 1.2;
                        }
                    }
                    if let Some(quality) = w.quality {
                        score -= (1.0 - quality) * 20.0;
                    }
                }
            }
            Class::Lan | Class::Other => {}
        }

        score.clamp(0.0, 100.0)
    }

    /// Predictive triggers (§4.F), orthogonal to the reactive score. Each
    /// returns `Some(reason)` when it demands an immediate move off the
    /// member regardless of its score.
    fn predictive_trigger(
        &self,
        member: &Member,
        window: &[Sample],
        intel: &IntelligenceThresholds,
    ) -> Option<&'static str> {
        if window.is_empty() {
            return None;
        }
        let latest = window.last().unwrap();
        let trackers = self.trackers.lock().unwrap();
        let t = trackers.get(&member.name);

        match member.class {
            Class::Starlink => {
                if let Some(sl) = &latest.starlink {
                    if sl.thermal_throttle {
                        return Some("thermal_throttle");
                    }
                    if sl.swupdate_reboot_ready {
                        return Some("pending_reboot");
                    }
                    let outage_pattern = window
                        .iter()
                        .rev()
                        .take(5)
                        .filter(|s| s.starlink.as_ref().is_some_and(|sl| sl.outages > 0))
                        .count()
                        >= 3;
                    if outage_pattern {
                        return Some("outage_pattern_detected");
                    }
                    let total_outages: u32 = window
                        .iter()
                        .rev()
                        .take(5)
                        .filter_map(|s| s.starlink.as_ref().map(|sl| sl.outages))
                        .sum();
                    if total_outages >= 5 {
                        return Some("outage_total_threshold");
                    }
                    let severe_events = sl.events.iter().any(|e| {
                        matches!(
                            e.kind.as_str(),
                            "network_outage" | "thermal_shutdown" | "hardware_failure"
                        ) && e.severity != EventSeverity::Info
                    });
                    if severe_events {
                        return Some("severe_event");
                    }
                    if sl
                        .events
                        .iter()
                        .any(|e| e.kind == "obstruction_detected" && e.severity != EventSeverity::Info)
                    {
                        return Some("obstruction_detected");
                    }
                    let warning_count = sl
                        .events
                        .iter()
                        .filter(|e| e.severity == EventSeverity::Warning)
                        .count();
                    if warning_count >= 3 {
                        return Some("warning_event_threshold");
                    }
                }
                if let Some(t) = t {
                    if t.obstruction.is_initialized() && t.obstruction.velocity() > intel.starlink_obstruction_threshold / 10.0
                    {
                        return Some("obstruction_acceleration");
                    }
                    if t.snr.is_initialized() && t.snr.value() < 0.0 && t.snr.velocity() < -0.5 {
                        return Some("persistent_low_snr");
                    }
                }
            }
            Class::Cellular => {
                if let Some(c) = &latest.cellular {
                    if c.stability_score.is_some_and(|s| s < 30.0) {
                        return Some("stability_below_floor");
                    }
                    if c.cell_changes >= 3 {
                        return Some("cell_change_threshold");
                    }
                    if c.signal_variance.is_some_and(|v| v > 200.0) {
                        return Some("signal_variance_threshold");
                    }
                    if c.roaming
                        && c.rsrp.is_some_and(|r| r < intel.cellular_signal_threshold)
                        && c.cell_changes > 0
                    {
                        return Some("high_roaming_risk");
                    }
                }
                if let Some(t) = t {
                    if t.rsrp.is_initialized() && t.rsrp.velocity() < -2.0 {
                        return Some("rsrp_trend");
                    }
                    if t.rsrp.is_initialized() && t.rsrp.predict_ahead(5) < -120.0 {
                        return Some("predicted_rsrp_floor");
                    }
                    if t.sinr.is_initialized() && t.sinr.velocity() < -1.0 {
                        return Some("sinr_trend");
                    }
                }
            }
            Class::Wifi | Class::Lan | Class::Other => {
                if let Some(g) = &latest.generic {
                    let loss_ok = g
                        .loss_pct
                        .is_some_and(|l| l > self.thresholds.failover.loss_pct);
                    let latency_ok = g
                        .latency_ms
                        .is_some_and(|l| l > self.thresholds.failover.latency_ms);
                    if loss_ok || latency_ok {
                        let sustained = window
                            .iter()
                            .rev()
                            .take_while(|s| {
                                s.generic.as_ref().is_some_and(|g| {
                                    g.loss_pct.is_some_and(|l| l > self.thresholds.failover.loss_pct)
                                        || g.latency_ms.is_some_and(|l| l > self.thresholds.failover.latency_ms)
                                })
                            })
                            .count();
                        let span_s = sustained as u64 * 5; // approximate, tick-based
                        if span_s >= self.thresholds.failover.min_duration_s {
                            return Some("sustained_loss_or_latency");
                        }
                    }
                }
            }
        }
        None
    }

    /// Rough time-to-failure estimate in seconds for `member`, derived
    /// from the same trend trackers the predictive triggers read against.
    /// Surfaced for observability (the `metrics` IPC payload and a
    /// predictive [`Decision`]); nothing in `decide` consults it.
    pub fn ttf_estimate_s(&self, member: &Member, intel: &IntelligenceThresholds) -> Option<f64> {
        let trackers = self.trackers.lock().unwrap();
        let t = trackers.get(&member.name)?;
        match member.class {
            Class::Starlink => {
                if t.obstruction.is_initialized() && t.obstruction.velocity() > 0.0 {
                    let remaining = intel.starlink_obstruction_threshold - t.obstruction.value();
                    if remaining > 0.0 {
                        return Some(remaining / t.obstruction.velocity() * Self::TICK_S);
                    }
                }
                None
            }
            Class::Cellular => {
                if t.rsrp.is_initialized() && t.rsrp.velocity() < 0.0 {
                    let remaining = t.rsrp.value() - (-120.0);
                    if remaining > 0.0 {
                        return Some(remaining / -t.rsrp.velocity() * Self::TICK_S);
                    }
                }
                None
            }
            Class::Wifi | Class::Lan | Class::Other => None,
        }
    }

    /// Updates the member's degraded flag from its recent window and
    /// returns whether it is currently usable as a failover candidate.
    /// A member that has never crossed the failover floor is always
    /// usable; one that has must hold under the restore floor for
    /// `restore.min_duration_s` before becoming usable again.
    fn is_candidate(&self, member_name: &str, window: &[Sample], now: DateTime<Utc>) -> bool {
        let failover = &self.thresholds.failover;
        let restore = &self.thresholds.restore;

        let breach_cutoff = now - chrono::Duration::seconds(failover.min_duration_s as i64);
        let recent: Vec<&Sample> = window
            .iter()
            .rev()
            .take_while(|s| s.timestamp >= breach_cutoff)
            .collect();
        let breaching = !recent.is_empty()
            && recent.iter().all(|s| {
                s.generic.as_ref().is_some_and(|g| {
                    g.loss_pct.is_some_and(|l| l > failover.loss_pct)
                        || g.latency_ms.is_some_and(|l| l > failover.latency_ms)
                })
            });

        let mut hysteresis = self.hysteresis.lock().unwrap();
        let state = hysteresis.entry(member_name.to_string()).or_default();

        if breaching {
            state.degraded = true;
            state.good_since = None;
            return false;
        }

        if !state.degraded {
            return true;
        }

        let restore_cutoff = now - chrono::Duration::seconds(restore.min_duration_s as i64);
        let relevant: Vec<&Sample> = window.iter().filter(|s| s.timestamp >= restore_cutoff).collect();
        let all_under = !relevant.is_empty()
            && relevant.iter().all(|s| {
                s.generic.as_ref().map_or(true, |g| {
                    g.loss_pct.map_or(true, |l| l <= restore.loss_pct)
                        && g.latency_ms.map_or(true, |l| l <= restore.latency_ms)
                })
            });

        if all_under {
            let since = *state.good_since.get_or_insert(relevant[0].timestamp);
            if now.signed_duration_since(since).num_seconds() >= restore.min_duration_s as i64 {
                state.degraded = false;
                true
            } else {
                false
            }
        } else {
            state.good_since = None;
            false
        }
    }

    /// `decide(now) -> (member | no-change, reason)`.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        now: DateTime<Utc>,
        members: &[Member],
        current: Option<&str>,
        store: &TelemetryStore,
        weights: &HybridWeightManager,
        urgency: Urgency,
    ) -> Option<Decision> {
        let intel = &self.thresholds.intelligence;
        let mut best: Option<(String, f64, i32, i32, bool, &'static str)> = None; // name, combined, effective_weight, metric, predictive, reason
        let mut current_combined = None;
        // Set when the *current* member's own predictive trigger fires.
        // That case must force a move off it regardless of what `best`
        // otherwise holds — the trigger means the active member, not some
        // other candidate, is the one about to fail.
        let mut current_trigger_reason: Option<&'static str> = None;

        for member in members {
            if !member.eligible {
                continue;
            }
            let history_cutoff = now
                - chrono::Duration::seconds(self.thresholds.main.history_window_s as i64);
            let window = store.get_samples(&member.name, history_cutoff);
            let Some(latest) = window.last() else {
                continue;
            };
            let unreachable = latest.quality == 0.0;
            if let Some(good) = window.iter().rev().find(|s| s.quality > 0.0) {
                self.update_trackers(&member.name, good);
            } else if unreachable {
                continue;
            }

            if let Some(limit) = &member.data_limit {
                let forbidden = match (urgency, limit.status()) {
                    (Urgency::Normal, DataLimitStatus::Ok | DataLimitStatus::Disabled) => false,
                    (Urgency::Normal, _) => true,
                    (Urgency::Emergency, DataLimitStatus::Exceeded) => true,
                    (Urgency::Emergency, _) => false,
                };
                if forbidden {
                    continue;
                }
            }

            let predictive_reason = if self.thresholds.main.predictive && !unreachable {
                self.predictive_trigger(member, &window, intel)
            } else {
                None
            };

            let score = if unreachable {
                0.0
            } else {
                Self::reactive_score(member, latest, intel)
            };
            let effective_weight = weights.effective_weight(&member.name, member.class);
            let combined = effective_weight as f64 * score / 100.0;

            if Some(member.name.as_str()) == current {
                current_combined = Some(combined);
            }

            if let Some(reason) = predictive_reason {
                // Apply the feedback adjustment so subsequent ticks stay
                // consistent without re-deriving this penalty.
                weights.apply(
                    &member.name,
                    member.class,
                    (effective_weight / 2).max(0),
                    reason,
                    AdjustmentType::Penalty,
                    chrono::Duration::seconds(
                        self.thresholds.weights.temporary_adjustment_duration_s as i64,
                    ),
                );
                if Some(member.name.as_str()) == current {
                    // The active member is unhealthy enough to short-circuit
                    // the reactive score — it cannot be its own replacement,
                    // so record the trigger and let the best alternative
                    // found elsewhere in this pass take over below.
                    current_trigger_reason = Some(reason);
                } else {
                    let better = best
                        .as_ref()
                        .map(|(_, c, ..)| combined > *c)
                        .unwrap_or(true);
                    if better {
                        best = Some((
                            member.name.clone(),
                            combined,
                            effective_weight,
                            member.metric,
                            true,
                            reason,
                        ));
                    }
                }
                continue;
            }

            let candidate_ok = Some(member.name.as_str()) == current
                || self.is_candidate(&member.name, &window, now)
                || current.is_none();

            if !candidate_ok {
                continue;
            }

            let better = match &best {
                None => true,
                Some((name, c, w, m, _, _)) => {
                    combined > *c
                        || (combined == *c && effective_weight > *w)
                        || (combined == *c && effective_weight == *w && member.metric < *m)
                        || (combined == *c
                            && effective_weight == *w
                            && member.metric == *m
                            && member.name < *name)
                }
            };
            if better {
                best = Some((
                    member.name.clone(),
                    combined,
                    effective_weight,
                    member.metric,
                    false,
                    "best_combined_score",
                ));
            }
        }

        let (chosen, combined, _, _, mut predictive, mut reason) = best?;

        // The current member's own trigger outranks whatever reason the
        // chosen alternative was picked for — it is why we are leaving,
        // not why the alternative was entered.
        if let Some(cur_reason) = current_trigger_reason {
            predictive = true;
            reason = cur_reason;
        }

        if Some(chosen.as_str()) == current {
            return None;
        }

        if !predictive {
            if let Some(cur_combined) = current_combined {
                if combined - cur_combined < self.thresholds.main.switch_margin as f64 {
                    return None;
                }
            }
        }

        let ttf_estimate_s = if predictive {
            current
                .and_then(|cur| members.iter().find(|m| m.name == cur))
                .and_then(|cur_member| self.ttf_estimate_s(cur_member, intel))
        } else {
            None
        };

        Some(Decision {
            chosen_member: chosen,
            reason: reason.to_string(),
            taken_at: now,
            predecessor: current.map(|s| s.to_string()),
            predictive,
            ttf_estimate_s,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::model::{DataLimit, GenericMetrics, StarlinkEvent, StarlinkMetrics};
    use chrono::Duration;

    fn member(name: &str, class: Class) -> Member {
        Member {
            name: name.to_string(),
            iface: format!("{name}0"),
            class,
            base_weight: class.fallback_weight(),
            metric: 10,
            eligible: true,
            prefer_roaming: false,
            metered: false,
            max_latency_ms: None,
            max_loss_pct: None,
            probes: vec![],
            effective_weight: class.fallback_weight(),
            last_seen: Utc::now(),
            uptime_since: Some(Utc::now() - Duration::seconds(120)),
            data_limit: None,
        }
    }

    fn generic_sample(name: &str, ts: DateTime<Utc>, latency_ms: f64, loss_pct: f64) -> Sample {
        Sample {
            timestamp: ts,
            member_name: name.to_string(),
            quality: 1.0,
            generic: Some(GenericMetrics {
                latency_ms: Some(latency_ms),
                loss_pct: Some(loss_pct),
                jitter_ms: Some(1.0),
                throughput_kbps: None,
            }),
            starlink: None,
            cellular: None,
            wifi: None,
        }
    }

    #[test]
    fn clean_link_scores_higher_than_lossy_link() {
        let now = Utc::now();
        let clean = generic_sample("a", now, 20.0, 0.0);
        let lossy = generic_sample("a", now, 300.0, 10.0);
        let intel = IntelligenceThresholds::default();
        let m = member("a", Class::Lan);
        assert!(
            DecisionEngine::reactive_score(&m, &clean, &intel)
                > DecisionEngine::reactive_score(&m, &lossy, &intel)
        );
    }

    #[test]
    fn switch_margin_blocks_marginal_improvement() {
        let thresholds = Thresholds::default();
        let engine = DecisionEngine::new(thresholds);
        let store = TelemetryStore::new(24, 64);
        let weights = HybridWeightManager::new(thresholds.weights);
        weights.load_originals([("starlink".to_string(), 100), ("cell1".to_string(), 80)].into());

        let now = Utc::now();
        store.add_sample(generic_sample("starlink", now, 40.0, 0.0));
        store.add_sample(generic_sample("cell1", now, 41.0, 0.0));

        let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
        let decision = engine.decide(
            now,
            &members,
            Some("starlink"),
            &store,
            &weights,
            Urgency::Normal,
        );
        assert!(decision.is_none(), "near-identical scores should not trigger a switch");
    }

    #[test]
    fn sustained_degradation_triggers_switch_to_healthy_member() {
        let thresholds = Thresholds::default();
        let engine = DecisionEngine::new(thresholds);
        let store = TelemetryStore::new(24, 64);
        let weights = HybridWeightManager::new(thresholds.weights);
        weights.load_originals([("starlink".to_string(), 100), ("cell1".to_string(), 80)].into());

        let now = Utc::now();
        store.add_sample(generic_sample("starlink", now, 900.0, 30.0));
        store.add_sample(generic_sample("cell1", now, 30.0, 0.0));

        let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
        let decision = engine
            .decide(now, &members, Some("starlink"), &store, &weights, Urgency::Normal)
            .expect("degraded primary should trigger a switch");
        assert_eq!(decision.chosen_member, "cell1");
    }

    #[test]
    fn thermal_throttle_triggers_predictive_switch_even_with_good_score() {
        let thresholds = Thresholds::default();
        let engine = DecisionEngine::new(thresholds);
        let store = TelemetryStore::new(24, 64);
        let weights = HybridWeightManager::new(thresholds.weights);
        weights.load_originals([("starlink".to_string(), 100), ("cell1".to_string(), 80)].into());

        let now = Utc::now();
        store.add_sample(Sample {
            timestamp: now,
            member_name: "starlink".to_string(),
            quality: 1.0,
            generic: None,
            starlink: Some(StarlinkMetrics {
                obstruction_pct: Some(0.0),
                snr: Some(10.0),
                thermal_throttle: true,
                swupdate_reboot_ready: false,
                outages: 0,
                events: vec![],
            }),
            cellular: None,
            wifi: None,
        });
        store.add_sample(generic_sample("cell1", now, 60.0, 0.5));

        let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
        let decision = engine
            .decide(now, &members, Some("starlink"), &store, &weights, Urgency::Normal)
            .expect("thermal throttle should force a predictive switch");
        assert!(decision.predictive);
        assert_eq!(decision.reason, "thermal_throttle");
    }

    #[test]
    fn exceeded_data_limit_is_excluded_under_normal_urgency() {
        let thresholds = Thresholds::default();
        let engine = DecisionEngine::new(thresholds);
        let store = TelemetryStore::new(24, 64);
        let weights = HybridWeightManager::new(thresholds.weights);
        weights.load_originals([("cell1".to_string(), 80), ("lan1".to_string(), 40)].into());

        let now = Utc::now();
        store.add_sample(generic_sample("cell1", now, 20.0, 0.0));
        store.add_sample(generic_sample("lan1", now, 25.0, 0.0));

        let mut capped = member("cell1", Class::Cellular);
        capped.data_limit = Some(DataLimit {
            enabled: true,
            limit_mb: 1000,
            current_usage_mb: 1000,
            reset_hour: 0,
            days_until_reset: 5,
        });
        let members = vec![capped, member("lan1", Class::Lan)];

        let decision = engine.decide(now, &members, Some("lan1"), &store, &weights, Urgency::Normal);
        assert!(
            decision.is_none() || decision.unwrap().chosen_member != "cell1",
            "an exceeded data limit must not be selected outside an emergency"
        );
    }

    #[test]
    fn ttf_estimate_tracks_worsening_cellular_rsrp() {
        let thresholds = Thresholds::default();
        let engine = DecisionEngine::new(thresholds);
        let store = TelemetryStore::new(24, 64);
        let weights = HybridWeightManager::new(thresholds.weights);
        weights.load_originals([("cell1".to_string(), 80)].into());

        let m = member("cell1", Class::Cellular);
        let now = Utc::now();
        for i in 0..10 {
            let sample = Sample {
                timestamp: now + Duration::seconds(i),
                member_name: "cell1".to_string(),
                quality: 1.0,
                generic: None,
                starlink: None,
                cellular: Some(crate::model::CellularMetrics {
                    rsrp: Some(-90.0 - i as f64 * 2.0),
                    rsrq: None,
                    sinr: Some(10.0),
                    cell_id: None,
                    roaming: false,
                    stability_score: Some(90.0),
                    cell_changes: 0,
                    signal_variance: Some(0.0),
                }),
                wifi: None,
            };
            store.add_sample(sample);
        }
        engine.decide(
            now + Duration::seconds(10),
            &[m.clone()],
            Some("cell1"),
            &store,
            &weights,
            Urgency::Normal,
        );

        let intel = IntelligenceThresholds::default();
        let ttf = engine.ttf_estimate_s(&m, &intel);
        assert!(ttf.is_some(), "declining rsrp trend should yield a ttf estimate");
        assert!(ttf.unwrap() > 0.0);
    }

    #[test]
    fn critical_starlink_events_outweigh_info_events() {
        let intel = IntelligenceThresholds::default();
        let m = member("starlink", Class::Starlink);
        let now = Utc::now();
        let mk = |severity: EventSeverity| StarlinkMetrics {
            obstruction_pct: Some(0.0),
            snr: Some(10.0),
            thermal_throttle: false,
            swupdate_reboot_ready: false,
            outages: 0,
            events: vec![StarlinkEvent {
                kind: "generic".to_string(),
                severity,
                timestamp: now,
                message: String::new(),
            }],
        };
        let critical = Sample {
            timestamp: now,
            member_name: "starlink".to_string(),
            quality: 1.0,
            generic: None,
            starlink: Some(mk(EventSeverity::Critical)),
            cellular: None,
            wifi: None,
        };
        let info = Sample {
            starlink: Some(mk(EventSeverity::Info)),
            ..critical.clone()
        };
        assert!(
            DecisionEngine::reactive_score(&m, &info, &intel)
                > DecisionEngine::reactive_score(&m, &critical, &intel)
        );
    }
}
