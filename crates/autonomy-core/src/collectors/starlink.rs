//! Starlink collector.
//!
//! Queries the dish's local API (`192.168.100.1:9200` by default) over
//! its HTTP fallback surface — method names and response fields are
//! read-only telemetry the collector tolerates; unknown fields are
//! ignored and missing ones are left absent rather than defaulted to a
//! misleading zero.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use super::{http_get, Collector};
use crate::config::StarlinkApiConfig;
use crate::model::{EventSeverity, Member, Sample, StarlinkEvent, StarlinkMetrics};

#[derive(Debug, Deserialize, Default)]
struct DishStatusBody {
    #[serde(default)]
    obstruction_pct: Option<f64>,
    #[serde(default)]
    snr: Option<f64>,
    #[serde(default)]
    thermal_throttle: Option<bool>,
    #[serde(default)]
    swupdate_reboot_ready: Option<bool>,
    #[serde(default)]
    outages: Option<u32>,
    #[serde(default)]
    events: Vec<DishEventBody>,
}

#[derive(Debug, Deserialize, Default)]
struct DishEventBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    message: String,
}

fn parse_severity(s: &str) -> EventSeverity {
    match s {
        "critical" => EventSeverity::Critical,
        "warning" => EventSeverity::Warning,
        _ => EventSeverity::Info,
    }
}

pub struct StarlinkCollector {
    config: StarlinkApiConfig,
}

impl StarlinkCollector {
    pub fn new(config: StarlinkApiConfig) -> Self {
        StarlinkCollector { config }
    }
}

#[async_trait::async_trait]
impl Collector for StarlinkCollector {
    async fn collect(&self, member: &Member, deadline: Duration) -> Sample {
        let now = Utc::now();
        let body = match http_get(&self.config.host, self.config.port, "/status", deadline).await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(member = %member.name, error = %e, "starlink dish unreachable");
                return Sample::unreachable(&member.name, now);
            }
        };

        let parsed: DishStatusBody = serde_json::from_slice(&body).unwrap_or_default();

        let events = parsed
            .events
            .into_iter()
            .map(|e| StarlinkEvent {
                kind: e.kind,
                severity: parse_severity(&e.severity),
                timestamp: now,
                message: e.message,
            })
            .collect();

        Sample {
            timestamp: now,
            member_name: member.name.clone(),
            quality: 1.0,
            generic: None,
            starlink: Some(StarlinkMetrics {
                obstruction_pct: parsed.obstruction_pct,
                snr: parsed.snr,
                thermal_throttle: parsed.thermal_throttle.unwrap_or(false),
                swupdate_reboot_ready: parsed.swupdate_reboot_ready.unwrap_or(false),
                outages: parsed.outages.unwrap_or(0),
                events,
            }),
            cellular: None,
            wifi: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_body_leaving_missing_fields_absent() {
        let body = br#"{"obstruction_pct": 3.2}"#;
        let parsed: DishStatusBody = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed.obstruction_pct, Some(3.2));
        assert_eq!(parsed.snr, None);
        assert!(parsed.events.is_empty());
    }

    #[test]
    fn ignores_unknown_fields() {
        let body = br#"{"obstruction_pct": 1.0, "some_future_field": {"nested": true}}"#;
        let parsed: DishStatusBody = serde_json::from_slice(body).unwrap();
        assert_eq!(parsed.obstruction_pct, Some(1.0));
    }

    #[test]
    fn severity_unrecognized_defaults_to_info() {
        assert_eq!(parse_severity("bogus"), EventSeverity::Info);
        assert_eq!(parse_severity("critical"), EventSeverity::Critical);
    }
}
