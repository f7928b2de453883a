//! End-to-end failover scenarios (§8 S1-S6), driving the Decision Engine
//! and Hybrid Weight Manager together the way the Supervisor's decision
//! loop does on every tick. Mirrors
//! `strata-bonding/tests/multi_link_bonding.rs`'s layout: one file, a
//! handful of small builders, one `#[test]` per scenario.
//!
//! 1. Starlink obstruction acceleration forces a predictive switch to a
//!    healthy cellular member, and the resulting penalty restores once its
//!    adjustment window elapses.
//! 2. An excellent-signal cellular member outscores a degraded Starlink
//!    primary once boosted, and the boost restores afterward.
//! 3. The last surviving member gets an emergency weight bump and is
//!    selected and restored the same way.
//! 4. A Starlink outage pattern on the *current* member forces a
//!    predictive switch away from it, not merely a penalty on some other
//!    candidate.
//! 5. Disabling `respect_user_weights` makes the Hybrid Weight Manager
//!    inert: every member falls back to its class weight and no
//!    adjustment is ever recorded.
//! 6. A cellular member past its data cap is excluded under normal
//!    traffic but reconsidered, and selected, once nothing else is up.

use chrono::{DateTime, Duration, Utc};

use autonomy_core::config::Thresholds;
use autonomy_core::decision::{DecisionEngine, Urgency};
use autonomy_core::model::{
    AdjustmentType, CellularMetrics, Class, DataLimit, GenericMetrics, Member, Sample,
    StarlinkMetrics,
};
use autonomy_core::store::TelemetryStore;
use autonomy_core::weights::HybridWeightManager;

// ─── Builders (mirror the ones in decision.rs's own unit tests) ──────────

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

fn starlink_sample(name: &str, ts: DateTime<Utc>, obstruction_pct: f64) -> Sample {
    Sample {
        timestamp: ts,
        member_name: name.to_string(),
        quality: 1.0,
        generic: None,
        starlink: Some(StarlinkMetrics {
            obstruction_pct: Some(obstruction_pct),
            snr: Some(10.0),
            thermal_throttle: false,
            swupdate_reboot_ready: false,
            outages: 0,
            events: vec![],
        }),
        cellular: None,
        wifi: None,
    }
}

fn starlink_outage_sample(name: &str, ts: DateTime<Utc>, outages: u32) -> Sample {
    Sample {
        starlink: Some(StarlinkMetrics {
            outages,
            ..StarlinkMetrics::default()
        }),
        ..starlink_sample(name, ts, 0.0)
    }
}

fn cellular_sample(name: &str, ts: DateTime<Utc>, rsrp: f64, stability_score: f64) -> Sample {
    Sample {
        timestamp: ts,
        member_name: name.to_string(),
        quality: 1.0,
        generic: None,
        starlink: None,
        cellular: Some(CellularMetrics {
            rsrp: Some(rsrp),
            rsrq: None,
            sinr: Some(12.0),
            cell_id: None,
            roaming: false,
            stability_score: Some(stability_score),
            cell_changes: 0,
            signal_variance: Some(0.0),
        }),
        wifi: None,
    }
}

fn capped(name: &str, class: Class, usage_pct: f64) -> Member {
    let mut m = member(name, class);
    let limit_mb = 10_000u64;
    m.data_limit = Some(DataLimit {
        enabled: true,
        limit_mb,
        current_usage_mb: (limit_mb as f64 * usage_pct / 100.0) as u64,
        reset_hour: 0,
        days_until_reset: 5,
    });
    m
}

// ─── S1: Starlink obstruction acceleration ───────────────────────────────

#[test]
fn s1_rising_obstruction_trend_forces_predictive_switch_to_cellular() {
    let thresholds = Thresholds::default();
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("starlink".to_string(), 100), ("cell1".to_string(), 80)].into());

    let start = Utc::now() - Duration::seconds(120);
    let starlink_only = [member("starlink", Class::Starlink)];
    // Obstruction climbing fast enough that the Kalman velocity crosses
    // `starlink_obstruction_threshold / 10.0` (1.0 pct/tick here). Each
    // tick needs its own `decide()` call — the tracker only advances on
    // the single newest sample each pass sees, the same way the
    // Supervisor's decision loop feeds it one tick at a time.
    for i in 0..20i64 {
        let tick = start + Duration::seconds(i * 5);
        store.add_sample(starlink_sample("starlink", tick, i as f64 * 3.0));
        engine.decide(tick, &starlink_only, Some("starlink"), &store, &weights, Urgency::Normal);
    }

    let now = start + Duration::seconds(20 * 5);
    store.add_sample(generic_sample("cell1", now, 30.0, 0.0));
    let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
    let decision = engine
        .decide(now, &members, Some("starlink"), &store, &weights, Urgency::Normal)
        .expect("a rising obstruction trend on the active member should force a switch");

    assert!(decision.predictive, "obstruction acceleration is a predictive trigger");
    assert_eq!(decision.chosen_member, "cell1");
    assert_eq!(decision.reason, "obstruction_acceleration");

    let adj = weights
        .adjustment("starlink")
        .expect("the triggering member should carry a feedback penalty");
    assert_eq!(adj.kind, AdjustmentType::Penalty);
    assert_eq!(adj.reason, "obstruction_acceleration");
    assert!(adj.adjusted_weight < 100, "penalty must reduce starlink's weight");
}

#[test]
fn s1_penalty_restores_once_its_window_elapses() {
    let thresholds = Thresholds::default();
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("starlink".to_string(), 100)].into());

    weights.apply(
        "starlink",
        Class::Starlink,
        50,
        "obstruction_acceleration",
        AdjustmentType::Penalty,
        Duration::seconds(-1), // already expired by the time it is read
    );

    assert_eq!(weights.effective_weight("starlink", Class::Starlink), 100);
    assert!(weights.adjustment("starlink").is_none());
}

// ─── S2: Excellent cellular signal outscores a degraded Starlink link ────

#[test]
fn s2_boosted_cellular_member_wins_over_a_degraded_starlink_primary() {
    let thresholds = Thresholds::default();
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("starlink".to_string(), 100), ("cell1".to_string(), 80)].into());

    let now = Utc::now();
    // Stable, moderate obstruction: low enough that no predictive trigger
    // fires, high enough to drag the reactive score well down.
    store.add_sample(starlink_sample("starlink", now, 20.0));
    store.add_sample(cellular_sample("cell1", now, -65.0, 95.0));

    // The Hybrid Weight Manager applies the boost once the collector layer
    // observes the excellent signal; decide() only consumes the result.
    let boosted = weights.apply(
        "cell1",
        Class::Cellular,
        95,
        "excellent_rsrp",
        AdjustmentType::Boost,
        Duration::seconds(thresholds.weights.temporary_adjustment_duration_s as i64),
    );
    assert!(boosted, "boost should be accepted under default policy");
    assert_eq!(weights.effective_weight("cell1", Class::Cellular), 95);

    let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
    let decision = engine
        .decide(now, &members, Some("starlink"), &store, &weights, Urgency::Normal)
        .expect("boosted, excellent cellular link should outscore a degraded starlink primary");
    assert_eq!(decision.chosen_member, "cell1");
}

#[test]
fn s2_boost_restores_once_its_window_elapses() {
    let thresholds = Thresholds::default();
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("cell1".to_string(), 80)].into());

    weights.apply(
        "cell1",
        Class::Cellular,
        95,
        "excellent_rsrp",
        AdjustmentType::Boost,
        Duration::seconds(-1),
    );

    assert_eq!(weights.effective_weight("cell1", Class::Cellular), 80);
    assert!(weights.adjustment("cell1").is_none());
}

// ─── S3: Emergency single-link selection ─────────────────────────────────

#[test]
fn s3_last_surviving_member_gets_an_emergency_bump_and_is_selected() {
    let thresholds = Thresholds::default();
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("cell2".to_string(), 84)].into());

    let now = Utc::now();
    // starlink and cell1 report nothing (unreachable/no samples); only
    // cell2 has a live sample and is eligible to be chosen at all.
    store.add_sample(generic_sample("cell2", now, 40.0, 1.0));

    let emergency_applied = weights.apply(
        "cell2",
        Class::Cellular,
        100,
        "last_surviving_member",
        AdjustmentType::Emergency,
        Duration::seconds(thresholds.weights.emergency_adjustment_duration_s as i64),
    );
    assert!(emergency_applied);

    let members = vec![
        member("starlink", Class::Starlink),
        member("cell1", Class::Cellular),
        member("cell2", Class::Cellular),
    ];
    let decision = engine
        .decide(now, &members, None, &store, &weights, Urgency::Emergency)
        .expect("the only reporting member should be chosen");
    assert_eq!(decision.chosen_member, "cell2");
    assert_eq!(weights.effective_weight("cell2", Class::Cellular), 100);
}

#[test]
fn s3_emergency_bump_restores_once_its_window_elapses() {
    let thresholds = Thresholds::default();
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("cell2".to_string(), 84)].into());

    weights.apply(
        "cell2",
        Class::Cellular,
        100,
        "last_surviving_member",
        AdjustmentType::Emergency,
        Duration::seconds(-1),
    );

    assert_eq!(weights.effective_weight("cell2", Class::Cellular), 84);
    assert!(weights.adjustment("cell2").is_none());
}

// ─── S4: Outage pattern on the active member ─────────────────────────────

#[test]
fn s4_outage_pattern_on_the_active_member_forces_a_predictive_switch() {
    let thresholds = Thresholds::default();
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("starlink".to_string(), 100), ("cell1".to_string(), 80)].into());

    let now = Utc::now();
    // Outages across the last 5 samples: 1, 0, 1, 1, 1 — 4 of 5 nonzero,
    // over the >= 3-of-5 threshold `predictive_trigger` checks for.
    let pattern = [1u32, 0, 1, 1, 1];
    for (i, outages) in pattern.iter().enumerate() {
        store.add_sample(starlink_outage_sample(
            "starlink",
            now - Duration::seconds((pattern.len() - i) as i64 * 5),
            *outages,
        ));
    }
    store.add_sample(generic_sample("cell1", now, 30.0, 0.0));

    let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
    let decision = engine
        .decide(now, &members, Some("starlink"), &store, &weights, Urgency::Normal)
        .expect("an outage pattern on the active member must force a predictive switch");

    assert!(decision.predictive);
    assert_eq!(decision.reason, "outage_pattern_detected");
    assert_eq!(decision.chosen_member, "cell1");
}

// ─── S5: Weight policy disabled ──────────────────────────────────────────

#[test]
fn s5_disabling_respect_user_weights_makes_the_manager_inert() {
    let mut thresholds = Thresholds::default();
    thresholds.weights.respect_user_weights = false;
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("starlink".to_string(), 40), ("cell1".to_string(), 99)].into());

    assert_eq!(
        weights.effective_weight("starlink", Class::Starlink),
        Class::Starlink.fallback_weight(),
        "operator weight should be ignored once respect_user_weights is off"
    );
    assert_eq!(
        weights.effective_weight("cell1", Class::Cellular),
        Class::Cellular.fallback_weight()
    );

    let applied = weights.apply(
        "cell1",
        Class::Cellular,
        95,
        "excellent_rsrp",
        AdjustmentType::Boost,
        Duration::seconds(60),
    );
    assert!(applied, "apply() itself is not policy-gated by respect_user_weights");
    assert_eq!(
        weights.effective_weight("cell1", Class::Cellular),
        Class::Cellular.fallback_weight(),
        "reads still ignore any adjustment while the manager is inert"
    );

    let now = Utc::now();
    store.add_sample(generic_sample("starlink", now, 40.0, 0.0));
    store.add_sample(generic_sample("cell1", now, 40.0, 0.0));
    let members = vec![member("starlink", Class::Starlink), member("cell1", Class::Cellular)];
    let decision = engine.decide(now, &members, Some("cell1"), &store, &weights, Urgency::Normal);
    if let Some(decision) = decision {
        assert_eq!(
            decision.chosen_member, "starlink",
            "with equal scores, fallback weights (100 vs 80) should favor starlink, not the ignored operator weights"
        );
    }
}

// ─── S6: Data-cap avoidance ───────────────────────────────────────────────

#[test]
fn s6_critical_data_cap_is_avoided_normally_but_used_as_a_last_resort() {
    let thresholds = Thresholds::default();
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("cell1".to_string(), 80), ("lan1".to_string(), 40)].into());

    let now = Utc::now();
    store.add_sample(generic_sample("cell1", now, 20.0, 0.0));
    store.add_sample(generic_sample("lan1", now, 25.0, 0.0));

    let cell1 = capped("cell1", Class::Cellular, 97.0);
    assert_eq!(
        cell1.data_limit.unwrap().status(),
        autonomy_core::model::DataLimitStatus::Critical
    );

    let members = vec![cell1.clone(), member("lan1", Class::Lan)];
    let normal = engine.decide(now, &members, Some("lan1"), &store, &weights, Urgency::Normal);
    assert!(
        normal.is_none() || normal.unwrap().chosen_member != "cell1",
        "a critical data cap must be avoided under normal urgency"
    );

    // lan1 goes away entirely; cell1 is the only member reporting.
    let members = vec![cell1];
    let emergency = engine
        .decide(now, &members, None, &store, &weights, Urgency::Emergency)
        .expect("a critical (not exceeded) cap must be usable once nothing else is up");
    assert_eq!(emergency.chosen_member, "cell1");
}

#[test]
fn s6_exceeded_data_cap_is_never_selected_even_as_last_resort() {
    let thresholds = Thresholds::default();
    let engine = DecisionEngine::new(thresholds);
    let store = TelemetryStore::new(24, 64);
    let weights = HybridWeightManager::new(thresholds.weights);
    weights.load_originals([("cell1".to_string(), 80)].into());

    let now = Utc::now();
    store.add_sample(generic_sample("cell1", now, 20.0, 0.0));

    let cell1 = capped("cell1", Class::Cellular, 100.0);
    assert_eq!(
        cell1.data_limit.unwrap().status(),
        autonomy_core::model::DataLimitStatus::Exceeded
    );

    let members = vec![cell1];
    let decision = engine.decide(now, &members, None, &store, &weights, Urgency::Emergency);
    assert!(
        decision.is_none(),
        "an exceeded cap must stay excluded even with no other member up"
    );
}
