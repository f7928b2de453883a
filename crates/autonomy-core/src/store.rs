//! Telemetry Store (§4.B): bounded per-member ring of samples plus a
//! bounded, time-ordered event log.
//!
//! Guarded by a single mutex, consistent with §5 ("guarded by a mutex
//! covering all maps; critical sections are O(members)"). Samples are
//! owned exclusively by the store; nothing else holds them longer-term.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::Sample;

/// A rough per-sample byte cost used for the RAM budget. Generous enough
/// to account for serde overhead without requiring an actual
/// serialization pass on every insert.
const BYTES_PER_SAMPLE: u64 = 512;
const BYTES_PER_EVENT: u64 = 256;

#[derive(Debug, Clone, Serialize)]
pub struct StoredEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub fields: serde_json::Value,
}

struct Inner {
    samples: HashMap<String, Vec<Sample>>,
    events: Vec<StoredEvent>,
    retention_hours: u32,
    max_ram_mb: u64,
}

impl Inner {
    fn ram_budget_bytes(&self) -> u64 {
        self.max_ram_mb * 1_048_576
    }

    fn current_bytes(&self) -> u64 {
        let sample_bytes: u64 = self
            .samples
            .values()
            .map(|v| v.len() as u64 * BYTES_PER_SAMPLE)
            .sum();
        sample_bytes + self.events.len() as u64 * BYTES_PER_EVENT
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::hours(self.retention_hours as i64);
        for samples in self.samples.values_mut() {
            let first_live = samples.partition_point(|s| s.timestamp < cutoff);
            if first_live > 0 {
                samples.drain(0..first_live);
            }
        }
        let event_cutoff = cutoff;
        if let Some(first_live) = self
            .events
            .iter()
            .position(|e| e.timestamp >= event_cutoff)
        {
            self.events.drain(0..first_live);
        } else if self.events.iter().all(|e| e.timestamp < event_cutoff) {
            self.events.clear();
        }
    }

    /// Evict the oldest samples across all members, proportionally, until
    /// the RAM budget is satisfied.
    fn evict_over_budget(&mut self) {
        let budget = self.ram_budget_bytes();
        while self.current_bytes() > budget {
            let Some((oldest_member, _)) = self
                .samples
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .min_by_key(|(_, v)| v.first().map(|s| s.timestamp))
            else {
                break;
            };
            let oldest_member = oldest_member.clone();
            if let Some(v) = self.samples.get_mut(&oldest_member) {
                if !v.is_empty() {
                    v.remove(0);
                }
            }
            if self.current_bytes() <= budget {
                break;
            }
            // Guard against an empty store never satisfying the budget.
            if self.samples.values().all(|v| v.is_empty()) && self.events.is_empty() {
                break;
            }
        }
    }
}

/// Per-member append-only ring of samples, plus a bounded event log.
pub struct TelemetryStore {
    inner: Mutex<Inner>,
}

impl TelemetryStore {
    pub fn new(retention_hours: u32, max_ram_mb: u64) -> Self {
        TelemetryStore {
            inner: Mutex::new(Inner {
                samples: HashMap::new(),
                events: Vec::new(),
                retention_hours,
                max_ram_mb,
            }),
        }
    }

    /// `add_sample(member, sample)`: O(1) amortized; evicts oldest entries
    /// if the retention window or RAM budget is exceeded.
    pub fn add_sample(&self, sample: Sample) {
        let mut inner = self.inner.lock().unwrap();
        let now = sample.timestamp;
        let entry = inner.samples.entry(sample.member_name.clone()).or_default();
        entry.push(sample);
        inner.evict_expired(now);
        inner.evict_over_budget();
    }

    /// `get_samples(member, since)`: timestamps newest-last.
    pub fn get_samples(&self, member: &str, since: DateTime<Utc>) -> Vec<Sample> {
        let inner = self.inner.lock().unwrap();
        inner
            .samples
            .get(member)
            .map(|v| {
                v.iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The most recent sample for a member, if any.
    pub fn latest_sample(&self, member: &str) -> Option<Sample> {
        let inner = self.inner.lock().unwrap();
        inner.samples.get(member).and_then(|v| v.last().cloned())
    }

    /// `get_events(since, limit)`: newest-first up to `limit`.
    pub fn get_events(&self, since: DateTime<Utc>, limit: usize) -> Vec<StoredEvent> {
        let inner = self.inner.lock().unwrap();
        inner
            .events
            .iter()
            .rev()
            .filter(|e| e.timestamp >= since)
            .take(limit)
            .cloned()
            .collect()
    }

    /// `members()`: known member names in the store.
    pub fn members(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.samples.keys().cloned().collect()
    }

    /// `record_event(kind, fields...)`: decisions, switches, failures.
    pub fn record_event(&self, kind: impl Into<String>, fields: serde_json::Value) {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        inner.events.push(StoredEvent {
            timestamp: now,
            kind: kind.into(),
            fields,
        });
        inner.evict_expired(now);
        inner.evict_over_budget();
    }
}
