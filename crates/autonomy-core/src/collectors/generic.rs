//! Generic collector: active TCP probes against the member's configured
//! `probes[]`, yielding latency, loss and jitter.
//!
//! Probe targets are `host:port` pairs. ICMP is not attempted — it needs
//! raw-socket privileges the daemon should not require — so reachability
//! is measured the same way [`crate::host`]'s IPC layer measures liveness
//! elsewhere in this codebase: a bare TCP connect, timed.

use std::time::Duration;

use chrono::Utc;

use super::{tcp_probe, Collector};
use crate::model::{GenericMetrics, Member, Sample};

const PROBES_PER_ROUND: usize = 4;

pub struct GenericCollector;

impl GenericCollector {
    pub fn new() -> Self {
        GenericCollector
    }
}

impl Default for GenericCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_target(target: &str) -> Option<(String, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

#[async_trait::async_trait]
impl Collector for GenericCollector {
    async fn collect(&self, member: &Member, deadline: Duration) -> Sample {
        let now = Utc::now();

        let Some(target) = member.probes.first().and_then(|t| parse_target(t)) else {
            return Sample::unreachable(&member.name, now);
        };

        let per_probe_deadline = deadline / PROBES_PER_ROUND as u32;
        let mut latencies = Vec::new();
        let mut failures = 0usize;

        for _ in 0..PROBES_PER_ROUND {
            match tcp_probe(&target.0, target.1, per_probe_deadline).await {
                Ok(elapsed) => latencies.push(elapsed.as_secs_f64() * 1000.0),
                Err(_) => failures += 1,
            }
        }

        if latencies.is_empty() {
            return Sample::unreachable(&member.name, now);
        }

        let loss_pct = (failures as f64 / PROBES_PER_ROUND as f64) * 100.0;
        let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
        let jitter_ms = if latencies.len() > 1 {
            let variance = latencies.iter().map(|l| (l - mean).powi(2)).sum::<f64>()
                / latencies.len() as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Sample {
            timestamp: now,
            member_name: member.name.clone(),
            quality: 1.0 - (failures as f64 / PROBES_PER_ROUND as f64) * 0.5,
            generic: Some(GenericMetrics {
                latency_ms: Some(mean),
                loss_pct: Some(loss_pct),
                jitter_ms: Some(jitter_ms),
                throughput_kbps: None,
            }),
            starlink: None,
            cellular: None,
            wifi: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_splits_host_and_port() {
        assert_eq!(
            parse_target("1.1.1.1:443"),
            Some(("1.1.1.1".to_string(), 443))
        );
        assert_eq!(parse_target("not-a-target"), None);
        assert_eq!(parse_target("host:notaport"), None);
    }
}
