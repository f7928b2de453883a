//! System stats and observability counters (SPEC_FULL.md §C.3): the
//! metrics/analytics dashboard is out of scope (§1), but the `status`
//! IPC verb still needs plain counters, and the Adaptive Sampler needs
//! CPU/RAM to feed its performance factor (§4.G) — both read from the
//! same `sysinfo::System`, exactly as the teacher's
//! `hardware::scan_system_stats` does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sysinfo::System;

/// Counters surfaced through the `status` IPC payload. Cheap,
/// lock-free increments; no histogram or percentile tracking — that
/// belongs to the external metrics dashboard, not this core.
#[derive(Default)]
pub struct Counters {
    pub switches_total: AtomicU64,
    pub predictive_triggers_total: AtomicU64,
    pub collector_failures_starlink: AtomicU64,
    pub collector_failures_cellular: AtomicU64,
    pub collector_failures_wifi: AtomicU64,
    pub collector_failures_generic: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "switches_total": self.switches_total.load(Ordering::Relaxed),
            "predictive_triggers_total": self.predictive_triggers_total.load(Ordering::Relaxed),
            "collector_failures_total": {
                "starlink": self.collector_failures_starlink.load(Ordering::Relaxed),
                "cellular": self.collector_failures_cellular.load(Ordering::Relaxed),
                "wifi": self.collector_failures_wifi.load(Ordering::Relaxed),
                "generic": self.collector_failures_generic.load(Ordering::Relaxed),
            },
        })
    }

    pub fn collector_failure(&self, class: autonomy_core::model::Class) {
        use autonomy_core::model::Class;
        let counter = match class {
            Class::Starlink => &self.collector_failures_starlink,
            Class::Cellular => &self.collector_failures_cellular,
            Class::Wifi => &self.collector_failures_wifi,
            Class::Lan | Class::Other => &self.collector_failures_generic,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Polls whole-host CPU usage for the Adaptive Sampler's performance
/// factor. `sysinfo` needs two refreshes separated by time to produce a
/// meaningful CPU percentage, so this holds the `System` across calls
/// rather than constructing a fresh one per poll.
pub struct SystemStats {
    sys: Mutex<System>,
}

impl SystemStats {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        SystemStats { sys: Mutex::new(sys) }
    }

    /// Whole-host CPU usage percentage, 0-100.
    pub fn cpu_pct(&self) -> f32 {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_cpu_all();
        sys.global_cpu_usage()
    }

    /// Whether the host reports a low-battery condition. Read from
    /// `/sys/class/power_supply/*/capacity` where present (mobile/marine
    /// installs running off a UPS or vehicle battery monitor); hosts with
    /// no such sysfs node (most routers on shore/mains power) report
    /// `false`.
    pub fn battery_low(&self) -> bool {
        let Ok(entries) = std::fs::read_dir("/sys/class/power_supply") else {
            return false;
        };
        for entry in entries.flatten() {
            let capacity_path = entry.path().join("capacity");
            if let Ok(raw) = std::fs::read_to_string(&capacity_path) {
                if let Ok(pct) = raw.trim().parse::<u32>() {
                    if pct < 20 {
                        return true;
                    }
                }
            }
        }
        false
    }
}

impl Default for SystemStats {
    fn default() -> Self {
        Self::new()
    }
}
