//! Typed, validated-once configuration structs for the core components.
//!
//! These are plain value types: the daemon's config layer is responsible
//! for reading them out of the host config store and validating them
//! into a frozen snapshot (see `autonomy-daemon::config`); the core never
//! reads the store directly.

use serde::{Deserialize, Serialize};

/// Supervisor-wide knobs (host config section `main`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MainConfig {
    pub enable: bool,
    pub poll_interval_ms: u64,
    pub history_window_s: u64,
    pub retention_hours: u32,
    pub max_ram_mb: u64,
    pub switch_margin: i32,
    pub min_uptime_s: u64,
    pub cooldown_s: u64,
    pub predictive: bool,
}

impl Default for MainConfig {
    fn default() -> Self {
        MainConfig {
            enable: true,
            poll_interval_ms: 1_000,
            history_window_s: 600,
            retention_hours: 24,
            max_ram_mb: 64,
            switch_margin: 10,
            min_uptime_s: 30,
            cooldown_s: 20,
            predictive: true,
        }
    }
}

/// Reactive failover floor (host config section `thresholds.failover`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FailoverThresholds {
    pub loss_pct: f64,
    pub latency_ms: f64,
    pub min_duration_s: u64,
}

impl Default for FailoverThresholds {
    fn default() -> Self {
        FailoverThresholds {
            loss_pct: 5.0,
            latency_ms: 400.0,
            min_duration_s: 10,
        }
    }
}

/// Restoration floor (host config section `thresholds.restore`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestoreThresholds {
    pub loss_pct: f64,
    pub latency_ms: f64,
    pub min_duration_s: u64,
}

impl Default for RestoreThresholds {
    fn default() -> Self {
        RestoreThresholds {
            loss_pct: 2.0,
            latency_ms: 200.0,
            min_duration_s: 30,
        }
    }
}

/// Hybrid Weight Manager policy (host config section `thresholds.weights`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightPolicy {
    pub respect_user_weights: bool,
    pub dynamic_adjustment: bool,
    pub emergency_override: bool,
    pub only_emergency_override: bool,
    pub restore_timeout_s: u64,
    pub minimal_adjustment_points: i32,
    pub temporary_boost_points: i32,
    pub temporary_adjustment_duration_s: u64,
    pub emergency_adjustment_duration_s: u64,
    /// Whether a class-fallback weight may be used in place of a reading
    /// from the host router config. Logged at `warn` on first use per
    /// member, never silently substituted.
    pub allow_class_fallback: bool,
}

impl Default for WeightPolicy {
    fn default() -> Self {
        WeightPolicy {
            respect_user_weights: true,
            dynamic_adjustment: true,
            emergency_override: true,
            only_emergency_override: false,
            restore_timeout_s: 300,
            minimal_adjustment_points: 5,
            temporary_boost_points: 15,
            temporary_adjustment_duration_s: 180,
            emergency_adjustment_duration_s: 60,
            allow_class_fallback: true,
        }
    }
}

/// Predictive trigger thresholds (host config section `thresholds.intelligence`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntelligenceThresholds {
    pub starlink_obstruction_threshold: f64,
    pub cellular_signal_threshold: f64,
    pub latency_degradation_threshold: f64,
    pub loss_threshold: f64,
}

impl Default for IntelligenceThresholds {
    fn default() -> Self {
        IntelligenceThresholds {
            starlink_obstruction_threshold: 10.0,
            cellular_signal_threshold: -110.0,
            latency_degradation_threshold: 2.0,
            loss_threshold: 0.15,
        }
    }
}

/// Starlink collector endpoint (host config section `starlink.api`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarlinkApiConfig {
    pub host: String,
    pub port: u16,
    pub timeout_s: u64,
}

impl Default for StarlinkApiConfig {
    fn default() -> Self {
        StarlinkApiConfig {
            host: "192.168.100.1".to_string(),
            port: 9200,
            timeout_s: 3,
        }
    }
}

/// Adaptive sampler bounds, shared by every member regardless of class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerBounds {
    pub min_interval_s: f64,
    pub max_interval_s: f64,
}

impl Default for SamplerBounds {
    fn default() -> Self {
        SamplerBounds {
            min_interval_s: 1.0,
            max_interval_s: 120.0,
        }
    }
}

/// Per-member operator policy (host config section `member.<name>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberPolicy {
    pub name: String,
    pub class: crate::model::Class,
    pub weight: i32,
    pub metric: i32,
    pub prefer_roaming: bool,
    pub metered: bool,
    pub probes: Vec<String>,
    pub up_threshold: Option<f64>,
    pub down_threshold: Option<f64>,
    pub min_rsrp_dbm: Option<f64>,
    pub min_sinr_db: Option<f64>,
}

/// Every tunable surfaced through the host config schema (§6), bundled
/// so components receive one read-only handle rather than a bag of
/// individually-injected values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub main: MainConfig,
    pub failover: FailoverThresholds,
    pub restore: RestoreThresholds,
    pub weights: WeightPolicy,
    pub intelligence: IntelligenceThresholds,
    pub sampler: SamplerBounds,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            main: MainConfig::default(),
            failover: FailoverThresholds::default(),
            restore: RestoreThresholds::default(),
            weights: WeightPolicy::default(),
            intelligence: IntelligenceThresholds::default(),
            sampler: SamplerBounds::default(),
        }
    }
}
