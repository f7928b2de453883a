//! Routing control (§4.A) backed by the host's multi-WAN policy package
//! (mwan3-equivalent): the daemon does not reimplement policy routing,
//! it reorders the `metric` the policy package already uses to pick a
//! primary member, commits that package, and shells the package's own
//! reload command to apply it — the same "narrow member-selection
//! mechanism" language of §6 ("it does not rewrite weights, priorities,
//! or rules outside of the narrow member-selection mechanism").

use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex};

use autonomy_core::error::HostAdapterError;
use autonomy_core::host::{ConfigStore, RoutingControl, RoutingMember};

fn unavailable(reason: impl Into<String>) -> HostAdapterError {
    HostAdapterError::Unavailable {
        capability: "routing_control".to_string(),
        reason: reason.into(),
    }
}

fn rejected(reason: impl Into<String>) -> HostAdapterError {
    HostAdapterError::Rejected {
        capability: "routing_control".to_string(),
        reason: reason.into(),
    }
}

/// Reorders `<package>.<member>.metric` so the chosen member is primary,
/// then applies the change via `<reload_cmd> restart` (default
/// `mwan3 restart`). Keeps a small on-disk marker of the last applied
/// member so `current_member()` survives a daemon restart without
/// needing to parse the policy package's live runtime status.
pub struct MwanRoutingControl {
    store: Arc<dyn ConfigStore>,
    package: String,
    reload_cmd: Vec<String>,
    state_path: PathBuf,
    /// Metric given to the primary member; every other known member gets
    /// `primary_metric + 10 * rank`, preserving their relative order.
    primary_metric: i32,
    known: Mutex<Vec<RoutingMember>>,
}

impl MwanRoutingControl {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        package: impl Into<String>,
        reload_cmd: Vec<String>,
        state_path: PathBuf,
    ) -> Self {
        MwanRoutingControl {
            store,
            package: package.into(),
            reload_cmd,
            state_path,
            primary_metric: 1,
            known: Mutex::new(Vec::new()),
        }
    }

    /// Register the known members so `list_members` and metric
    /// reordering have something to act on. Called by the daemon after
    /// each Discovery pass.
    pub fn set_known_members(&self, members: Vec<RoutingMember>) {
        *self.known.lock().unwrap() = members;
    }

    fn run_reload(&self) -> Result<(), HostAdapterError> {
        let Some((bin, args)) = self.reload_cmd.split_first() else {
            return Ok(());
        };
        let status = Command::new(bin)
            .args(args)
            .status()
            .map_err(|e| unavailable(format!("spawning `{bin}`: {e}")))?;
        if !status.success() {
            return Err(rejected(format!(
                "`{bin} {}` exited with {status}",
                args.join(" ")
            )));
        }
        Ok(())
    }
}

impl RoutingControl for MwanRoutingControl {
    fn list_members(&self) -> Result<Vec<RoutingMember>, HostAdapterError> {
        Ok(self.known.lock().unwrap().clone())
    }

    fn current_member(&self) -> Result<Option<String>, HostAdapterError> {
        match std::fs::read_to_string(&self.state_path) {
            Ok(s) => {
                let s = s.trim();
                Ok((!s.is_empty()).then(|| s.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(format!(
                "reading {}: {e}",
                self.state_path.display()
            ))),
        }
    }

    fn switch(&self, from: Option<&str>, to: &str) -> Result<(), HostAdapterError> {
        if from == Some(to) {
            return Ok(());
        }

        let members = self.known.lock().unwrap().clone();
        if !members.iter().any(|m| m.name == to) {
            return Err(rejected(format!("unknown member `{to}`")));
        }

        let mut rank = 0;
        for member in &members {
            let metric = if member.name == to {
                self.primary_metric
            } else {
                rank += 1;
                self.primary_metric + 10 * rank
            };
            self.store
                .set(&format!("{}.{}", self.package, member.name), "metric", &metric.to_string())?;
        }
        self.store.commit(&self.package)?;
        self.run_reload()?;

        std::fs::write(&self.state_path, to)
            .map_err(|e| unavailable(format!("writing {}: {e}", self.state_path.display())))?;
        Ok(())
    }
}
