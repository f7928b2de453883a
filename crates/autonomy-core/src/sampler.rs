//! Adaptive Sampler (§4.G): chooses each member's polling interval from
//! its class, observed processing lag, data-cap state, and battery, and
//! stretches or tightens the cadence gradually so collectors never
//! oscillate between extremes on a single noisy tick.
//!
//! State is kept per member (current interval, fall-behind counter) plus
//! one shared performance history fed by every collector's result,
//! mirroring the way `strata-bonding`'s bitrate adapter (`adaptation.rs`)
//! keeps a small rolling window rather than reacting to a single sample.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::SamplerBounds;
use crate::model::{Class, DataLimitStatus, Member};

const PERF_HISTORY_LEN: usize = 20;
const SLOW_PROCESSING_MS: f64 = 500.0;
const QUEUE_DEPTH_THRESHOLD: usize = 5;
const HIGH_CPU_PCT: f32 = 80.0;
const IDLE_CPU_PCT: f32 = HIGH_CPU_PCT / 4.0;

/// Polling posture the resulting interval implies. Derived, never fed
/// back into the calculation — purely a label for the `status` IPC
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    Unlimited,
    Aggressive,
    Conservative,
    Metered,
    Battery,
}

impl std::fmt::Display for SamplerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SamplerMode::Unlimited => "unlimited",
            SamplerMode::Aggressive => "aggressive",
            SamplerMode::Conservative => "conservative",
            SamplerMode::Metered => "metered",
            SamplerMode::Battery => "battery",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one collection round, fed back via `record_result`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionResult {
    pub processing_time: Duration,
    pub queue_depth: usize,
    pub data_usage_mbph: f64,
}

struct MemberState {
    interval_s: f64,
    fall_behind: u32,
}

struct Inner {
    members: HashMap<String, MemberState>,
    perf_history: VecDeque<CollectionResult>,
    cpu_pct: f32,
    battery_low: bool,
}

/// Per-member interval chooser, shared read/write across every collector
/// task (one `Arc<AdaptiveSampler>` for the whole daemon).
pub struct AdaptiveSampler {
    bounds: SamplerBounds,
    inner: Mutex<Inner>,
}

impl AdaptiveSampler {
    pub fn new(bounds: SamplerBounds) -> Self {
        AdaptiveSampler {
            bounds,
            inner: Mutex::new(Inner {
                members: HashMap::new(),
                perf_history: VecDeque::with_capacity(PERF_HISTORY_LEN),
                cpu_pct: 0.0,
                battery_low: false,
            }),
        }
    }

    /// Feed system-wide CPU usage (from `sysinfo`, sampled by the daemon
    /// supervisor) and a low-battery flag into the performance factor.
    /// Not a per-member signal — the host only has one CPU and one
    /// battery, regardless of how many members are being polled.
    pub fn record_system_stats(&self, cpu_pct: f32, battery_low: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.cpu_pct = cpu_pct;
        inner.battery_low = battery_low;
    }

    /// `record_result(member, processing_time, queue_depth, data_usage_mbph)`.
    pub fn record_result(&self, member: &str, result: CollectionResult) {
        let mut inner = self.inner.lock().unwrap();
        if inner.perf_history.len() >= PERF_HISTORY_LEN {
            inner.perf_history.pop_front();
        }
        inner.perf_history.push_back(result);

        let slow = result.processing_time.as_secs_f64() * 1000.0 > SLOW_PROCESSING_MS
            || result.queue_depth > QUEUE_DEPTH_THRESHOLD;
        let state = inner
            .members
            .entry(member.to_string())
            .or_insert(MemberState {
                interval_s: 0.0,
                fall_behind: 0,
            });
        if slow {
            state.fall_behind = state.fall_behind.saturating_add(1);
        } else {
            state.fall_behind = state.fall_behind.saturating_sub(1.min(state.fall_behind));
        }
    }

    fn performance_factor(&self, inner: &Inner) -> f64 {
        if inner.perf_history.is_empty() {
            return 1.0;
        }
        let n = inner.perf_history.len() as f64;
        let avg_processing_ms = inner
            .perf_history
            .iter()
            .map(|r| r.processing_time.as_secs_f64() * 1000.0)
            .sum::<f64>()
            / n;
        let avg_queue_depth = inner
            .perf_history
            .iter()
            .map(|r| r.queue_depth as f64)
            .sum::<f64>()
            / n;

        if avg_processing_ms > SLOW_PROCESSING_MS
            || avg_queue_depth > QUEUE_DEPTH_THRESHOLD as f64
            || inner.cpu_pct > HIGH_CPU_PCT
        {
            1.5
        } else if avg_processing_ms < SLOW_PROCESSING_MS / 4.0
            && avg_queue_depth < 1.0
            && inner.cpu_pct < IDLE_CPU_PCT
        {
            0.75
        } else {
            1.0
        }
    }

    fn data_usage_factor(&self, inner: &Inner, member: &Member) -> f64 {
        let Some(limit) = &member.data_limit else {
            return 1.0;
        };
        match limit.status() {
            DataLimitStatus::Exceeded | DataLimitStatus::Critical => 3.0,
            DataLimitStatus::Warning => 1.5,
            DataLimitStatus::Ok => {
                let avg_usage = inner
                    .perf_history
                    .iter()
                    .map(|r| r.data_usage_mbph)
                    .sum::<f64>()
                    / inner.perf_history.len().max(1) as f64;
                if avg_usage < 1.0 {
                    0.85
                } else {
                    1.0
                }
            }
            DataLimitStatus::Disabled => 1.0,
        }
    }

    /// `next_interval(member, now) -> duration`. Always within
    /// `[min_interval, max_interval]`; changes by at most 2x per call.
    pub fn next_interval(&self, member: &Member, _now: DateTime<Utc>) -> Duration {
        let mut inner = self.inner.lock().unwrap();
        let base = member.class.base_interval_s();

        let perf_factor = self.performance_factor(&inner);
        let data_factor = self.data_usage_factor(&inner, member);
        let battery_factor = if inner.battery_low && member.class != Class::Lan {
            1.5
        } else {
            1.0
        };
        let fall_behind = inner
            .members
            .get(&member.name)
            .map(|s| s.fall_behind)
            .unwrap_or(0);
        let backpressure_factor = 1.0 + (fall_behind.min(5) as f64 * 0.2);

        let target = (base * perf_factor * data_factor * battery_factor * backpressure_factor)
            .clamp(self.bounds.min_interval_s, self.bounds.max_interval_s);

        let state = inner
            .members
            .entry(member.name.clone())
            .or_insert(MemberState {
                interval_s: base,
                fall_behind: 0,
            });
        if state.interval_s <= 0.0 {
            state.interval_s = base;
        }

        // Gradual change only: at most double or halve per tick.
        let max_up = state.interval_s * 2.0;
        let max_down = state.interval_s / 2.0;
        let next = target
            .clamp(max_down, max_up)
            .clamp(self.bounds.min_interval_s, self.bounds.max_interval_s);
        state.interval_s = next;

        Duration::from_secs_f64(next)
    }

    /// Mode derived from current pressures, for observability only —
    /// never read back into `next_interval`'s own calculation.
    pub fn mode(&self, member: &Member) -> SamplerMode {
        let inner = self.inner.lock().unwrap();
        if member.data_limit.as_ref().is_some_and(|l| {
            !matches!(l.status(), DataLimitStatus::Ok | DataLimitStatus::Disabled)
        }) {
            return SamplerMode::Metered;
        }
        if inner.battery_low {
            return SamplerMode::Battery;
        }
        let fall_behind = inner
            .members
            .get(&member.name)
            .map(|s| s.fall_behind)
            .unwrap_or(0);
        if fall_behind > 0 {
            return SamplerMode::Conservative;
        }
        if inner.cpu_pct < IDLE_CPU_PCT {
            return SamplerMode::Aggressive;
        }
        SamplerMode::Unlimited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataLimit;
    use chrono::Utc;

    fn member(name: &str, class: Class) -> Member {
        Member {
            name: name.to_string(),
            iface: format!("{name}0"),
            class,
            base_weight: class.fallback_weight(),
            metric: 1,
            eligible: true,
            prefer_roaming: false,
            metered: false,
            max_latency_ms: None,
            max_loss_pct: None,
            probes: vec![],
            effective_weight: class.fallback_weight(),
            last_seen: Utc::now(),
            uptime_since: None,
            data_limit: None,
        }
    }

    #[test]
    fn interval_stays_within_bounds() {
        let sampler = AdaptiveSampler::new(SamplerBounds {
            min_interval_s: 1.0,
            max_interval_s: 120.0,
        });
        let m = member("starlink", Class::Starlink);
        for _ in 0..50 {
            let d = sampler.next_interval(&m, Utc::now());
            assert!(d.as_secs_f64() >= 1.0 && d.as_secs_f64() <= 120.0);
            sampler.record_result(
                "starlink",
                CollectionResult {
                    processing_time: Duration::from_millis(900),
                    queue_depth: 20,
                    data_usage_mbph: 0.0,
                },
            );
        }
    }

    #[test]
    fn interval_changes_by_at_most_double_per_tick() {
        let sampler = AdaptiveSampler::new(SamplerBounds::default());
        let m = member("cell1", Class::Cellular);
        let first = sampler.next_interval(&m, Utc::now()).as_secs_f64();
        // Saturate fall-behind to push the performance factor as high as
        // it will go; even so the next call can't jump past 2x.
        for _ in 0..10 {
            sampler.record_result(
                "cell1",
                CollectionResult {
                    processing_time: Duration::from_secs(5),
                    queue_depth: 50,
                    data_usage_mbph: 0.0,
                },
            );
        }
        let second = sampler.next_interval(&m, Utc::now()).as_secs_f64();
        assert!(second <= first * 2.0 + 1e-9);
    }

    #[test]
    fn data_cap_critical_stretches_interval_versus_ok() {
        let sampler = AdaptiveSampler::new(SamplerBounds::default());
        let mut capped = member("cell1", Class::Cellular);
        capped.data_limit = Some(DataLimit {
            enabled: true,
            limit_mb: 1000,
            current_usage_mb: 970,
            reset_hour: 0,
            days_until_reset: 3,
        });
        let uncapped = member("cell2", Class::Cellular);

        let capped_interval = sampler.next_interval(&capped, Utc::now());
        let open_interval = sampler.next_interval(&uncapped, Utc::now());
        assert!(capped_interval >= open_interval);
    }

    #[test]
    fn mode_reports_metered_when_data_limit_constrained() {
        let sampler = AdaptiveSampler::new(SamplerBounds::default());
        let mut capped = member("cell1", Class::Cellular);
        capped.data_limit = Some(DataLimit {
            enabled: true,
            limit_mb: 1000,
            current_usage_mb: 900,
            reset_hour: 0,
            days_until_reset: 3,
        });
        assert_eq!(sampler.mode(&capped), SamplerMode::Metered);
    }
}
