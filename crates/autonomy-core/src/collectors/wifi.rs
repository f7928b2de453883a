//! Wi-Fi collector: uses the host IPC bus to scan and compute
//! signal/noise/quality/channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::Collector;
use crate::host::IpcBus;
use crate::model::{Member, Sample, WifiMetrics};

pub struct WifiCollector {
    bus: Arc<dyn IpcBus>,
}

impl WifiCollector {
    pub fn new(bus: Arc<dyn IpcBus>) -> Self {
        WifiCollector { bus }
    }
}

/// Quality in `[0, 1]` from signal and noise, the way a wireless driver's
/// link-quality percentage is usually derived: `(signal - noise)`
/// normalized against a healthy SNR range.
fn quality_from_signal_noise(signal_dbm: f64, noise_dbm: Option<f64>) -> f64 {
    let snr = signal_dbm - noise_dbm.unwrap_or(-95.0);
    (snr / 40.0).clamp(0.0, 1.0)
}

#[async_trait::async_trait]
impl Collector for WifiCollector {
    async fn collect(&self, member: &Member, _deadline: Duration) -> Sample {
        let now = Utc::now();
        let scan = match self.bus.wifi_scan(&member.iface) {
            Ok(results) if !results.is_empty() => results,
            Ok(_) => {
                return Sample::unreachable(&member.name, now);
            }
            Err(e) => {
                tracing::debug!(member = %member.name, error = %e, "wifi scan failed");
                return Sample::unreachable(&member.name, now);
            }
        };

        // Strongest result is the link we're actually associated to.
        let best = scan
            .iter()
            .max_by(|a, b| a.signal_dbm.total_cmp(&b.signal_dbm))
            .expect("scan checked non-empty above");

        Sample {
            timestamp: now,
            member_name: member.name.clone(),
            quality: 1.0,
            generic: None,
            starlink: None,
            cellular: None,
            wifi: Some(WifiMetrics {
                signal_strength: Some(best.signal_dbm),
                noise_level: best.noise_dbm,
                quality: Some(quality_from_signal_noise(best.signal_dbm, best.noise_dbm)),
                channel: Some(best.channel),
            }),
        }
    }
}
