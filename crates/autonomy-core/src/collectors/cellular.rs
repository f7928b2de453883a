//! Cellular collector.
//!
//! Queries the modem (via the host IPC bus's modem diagnostics verb) for
//! RSRP/RSRQ/SINR, serving cell identity, registered operator, and
//! roaming flag, and maintains a small per-member window to derive
//! `cell_changes`, `signal_variance`, and a composite `stability_score`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use super::Collector;
use crate::host::IpcBus;
use crate::model::{CellularMetrics, Member, Sample};

const WINDOW_LEN: usize = 10;

#[derive(Default)]
struct MemberWindow {
    last_cell_id: Option<u64>,
    cell_changes: u32,
    rsrp_history: Vec<f64>,
}

impl MemberWindow {
    fn observe(&mut self, cell_id: Option<u64>, rsrp: Option<f64>) {
        if let Some(cid) = cell_id {
            if let Some(last) = self.last_cell_id {
                if last != cid {
                    self.cell_changes = self.cell_changes.saturating_add(1);
                }
            }
            self.last_cell_id = Some(cid);
        }
        if let Some(r) = rsrp {
            self.rsrp_history.push(r);
            if self.rsrp_history.len() > WINDOW_LEN {
                self.rsrp_history.remove(0);
            }
        }
    }

    fn variance(&self) -> Option<f64> {
        if self.rsrp_history.len() < 2 {
            return None;
        }
        let mean = self.rsrp_history.iter().sum::<f64>() / self.rsrp_history.len() as f64;
        let var = self
            .rsrp_history
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.rsrp_history.len() as f64;
        Some(var)
    }

    /// 0-100, higher is more stable: penalizes cell churn and signal
    /// variance, rewards a strong mean RSRP.
    fn stability_score(&self) -> Option<f64> {
        if self.rsrp_history.is_empty() {
            return None;
        }
        let mean = self.rsrp_history.iter().sum::<f64>() / self.rsrp_history.len() as f64;
        // -70 dBm -> 1.0, -120 dBm -> 0.0
        let signal_component = ((mean + 120.0) / 50.0).clamp(0.0, 1.0);
        let churn_penalty = (self.cell_changes as f64 * 0.1).min(0.5);
        let variance_penalty = self
            .variance()
            .map(|v| (v / 200.0).min(0.3))
            .unwrap_or(0.0);
        let score = (signal_component - churn_penalty - variance_penalty).clamp(0.0, 1.0);
        Some(score * 100.0)
    }
}

pub struct CellularCollector {
    bus: Arc<dyn IpcBus>,
    windows: Mutex<HashMap<String, MemberWindow>>,
}

impl CellularCollector {
    pub fn new(bus: Arc<dyn IpcBus>) -> Self {
        CellularCollector {
            bus,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl Collector for CellularCollector {
    async fn collect(&self, member: &Member, _deadline: Duration) -> Sample {
        let now = Utc::now();
        let status = match self.bus.modem_status(&member.iface) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(member = %member.name, error = %e, "modem unreachable");
                return Sample::unreachable(&member.name, now);
            }
        };

        let (cell_changes, signal_variance, stability_score) = {
            let mut windows = self.windows.lock().unwrap();
            let w = windows.entry(member.name.clone()).or_default();
            w.observe(status.cell_id, status.rsrp_dbm);
            (w.cell_changes, w.variance(), w.stability_score())
        };

        Sample {
            timestamp: now,
            member_name: member.name.clone(),
            quality: 1.0,
            generic: None,
            starlink: None,
            cellular: Some(CellularMetrics {
                rsrp: status.rsrp_dbm,
                rsrq: status.rsrq_db,
                sinr: status.sinr_db,
                cell_id: status.cell_id,
                roaming: status.roaming,
                stability_score,
                cell_changes,
                signal_variance,
            }),
            wifi: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_change_increments_counter() {
        let mut w = MemberWindow::default();
        w.observe(Some(1), Some(-80.0));
        w.observe(Some(1), Some(-81.0));
        w.observe(Some(2), Some(-80.0));
        assert_eq!(w.cell_changes, 1);
    }

    #[test]
    fn stability_score_drops_with_churn() {
        let mut stable = MemberWindow::default();
        for _ in 0..5 {
            stable.observe(Some(1), Some(-75.0));
        }

        let mut churny = MemberWindow::default();
        for i in 0..5 {
            churny.observe(Some(i), Some(-75.0));
        }

        assert!(stable.stability_score().unwrap() > churny.stability_score().unwrap());
    }

    #[test]
    fn variance_none_with_single_sample() {
        let mut w = MemberWindow::default();
        w.observe(Some(1), Some(-80.0));
        assert!(w.variance().is_none());
    }
}
