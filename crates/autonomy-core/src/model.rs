//! Data model shared by every component: members, samples, adjustments,
//! decisions. See the module docs on [`crate::store`] and [`crate::weights`]
//! for how these are owned and mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Class ───────────────────────────────────────────────────────────

/// Family of uplinks. Immutable once assigned to a [`Member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    Starlink,
    Cellular,
    Wifi,
    Lan,
    Other,
}

impl Class {
    /// Fallback weight used by the weight manager when no operator weight
    /// or adjustment is on file for a member of this class.
    pub fn fallback_weight(self) -> i32 {
        match self {
            Class::Starlink => 100,
            Class::Cellular => 80,
            Class::Wifi => 60,
            Class::Lan => 40,
            Class::Other => 20,
        }
    }

    /// Base polling interval for the adaptive sampler, in seconds.
    pub fn base_interval_s(self) -> f64 {
        match self {
            Class::Starlink => 5.0,
            Class::Cellular => 30.0,
            Class::Wifi => 10.0,
            Class::Lan => 5.0,
            Class::Other => 10.0,
        }
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Class::Starlink => "starlink",
            Class::Cellular => "cellular",
            Class::Wifi => "wifi",
            Class::Lan => "lan",
            Class::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Class {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starlink" => Ok(Class::Starlink),
            "cellular" => Ok(Class::Cellular),
            "wifi" => Ok(Class::Wifi),
            "lan" => Ok(Class::Lan),
            "other" => Ok(Class::Other),
            other => Err(format!("unknown class: {other}")),
        }
    }
}

// ── DataLimit ───────────────────────────────────────────────────────

/// Monthly data-cap state for a cellular member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DataLimit {
    pub enabled: bool,
    pub limit_mb: u64,
    pub current_usage_mb: u64,
    pub reset_hour: u8,
    pub days_until_reset: u32,
}

impl DataLimit {
    pub fn usage_pct(&self) -> f64 {
        if self.limit_mb == 0 {
            return 0.0;
        }
        (self.current_usage_mb as f64 / self.limit_mb as f64) * 100.0
    }

    /// Derived status from usage vs. cap.
    pub fn status(&self) -> DataLimitStatus {
        if !self.enabled {
            return DataLimitStatus::Disabled;
        }
        let pct = self.usage_pct();
        if pct >= 100.0 {
            DataLimitStatus::Exceeded
        } else if pct >= 95.0 {
            DataLimitStatus::Critical
        } else if pct >= 80.0 {
            DataLimitStatus::Warning
        } else {
            DataLimitStatus::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLimitStatus {
    Ok,
    Warning,
    Critical,
    Exceeded,
    Disabled,
}

// ── Member ──────────────────────────────────────────────────────────

/// A steerable uplink, as discovered from the host's routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Stable identity from the host routing config. Unique.
    pub name: String,
    /// OS device backing this member (e.g. `wwan0`, `eth1`).
    pub iface: String,
    /// Uplink family. Immutable once assigned.
    pub class: Class,

    // ── operator policy ──
    /// Operator-configured base weight, 0-100. Never mutated by the daemon.
    pub base_weight: i32,
    pub metric: i32,
    pub eligible: bool,
    pub prefer_roaming: bool,
    pub metered: bool,
    pub max_latency_ms: Option<f64>,
    pub max_loss_pct: Option<f64>,
    pub probes: Vec<String>,

    // ── runtime ──
    pub effective_weight: i32,
    pub last_seen: DateTime<Utc>,
    pub uptime_since: Option<DateTime<Utc>>,

    // ── cellular data plan ──
    pub data_limit: Option<DataLimit>,
}

impl Member {
    /// Seconds the member has been continuously up, if it has a recorded
    /// uptime start.
    pub fn uptime_s(&self, now: DateTime<Utc>) -> Option<i64> {
        self.uptime_since
            .map(|since| (now - since).num_seconds().max(0))
    }
}

// ── Sample ──────────────────────────────────────────────────────────

/// A single point-in-time measurement for one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub member_name: String,
    /// Collector-reported confidence in this sample, in `[0, 1]`.
    /// `0.0` marks an unreachable/failed collection.
    pub quality: f64,

    pub generic: Option<GenericMetrics>,
    pub starlink: Option<StarlinkMetrics>,
    pub cellular: Option<CellularMetrics>,
    pub wifi: Option<WifiMetrics>,
}

impl Sample {
    /// An empty, zero-quality sample marking an unreachable member.
    pub fn unreachable(member_name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Sample {
            timestamp: at,
            member_name: member_name.into(),
            quality: 0.0,
            generic: None,
            starlink: None,
            cellular: None,
            wifi: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenericMetrics {
    pub latency_ms: Option<f64>,
    pub loss_pct: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub throughput_kbps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarlinkEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: EventSeverity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StarlinkMetrics {
    pub obstruction_pct: Option<f64>,
    pub snr: Option<f64>,
    pub thermal_throttle: bool,
    pub swupdate_reboot_ready: bool,
    /// Count of outages observed within the collector's window.
    pub outages: u32,
    pub events: Vec<StarlinkEvent>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CellularMetrics {
    pub rsrp: Option<f64>,
    pub rsrq: Option<f64>,
    pub sinr: Option<f64>,
    pub cell_id: Option<u64>,
    pub roaming: bool,
    /// 0-100, higher is more stable.
    pub stability_score: Option<f64>,
    pub cell_changes: u32,
    pub signal_variance: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WifiMetrics {
    pub signal_strength: Option<f64>,
    pub noise_level: Option<f64>,
    pub quality: Option<f64>,
    pub channel: Option<u32>,
}

// ── WeightAdjustment ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Boost,
    Penalty,
    Emergency,
}

/// A temporary, time-bounded override of a member's effective weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightAdjustment {
    pub member_name: String,
    pub original_weight: i32,
    pub adjusted_weight: i32,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
}

impl WeightAdjustment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// An intent to run traffic over a given member. Recorded to the event
/// log for audit even when it does not change the active member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub chosen_member: String,
    pub reason: String,
    pub taken_at: DateTime<Utc>,
    pub predecessor: Option<String>,
    pub predictive: bool,
    /// Rough seconds-to-failure estimate for the member being moved away
    /// from, when this decision was predictive. Observability only — no
    /// trigger logic reads this back.
    pub ttf_estimate_s: Option<f64>,
}
