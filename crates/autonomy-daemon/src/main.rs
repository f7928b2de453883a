//! `autonomyd` — the multi-WAN failover daemon's entrypoint.
//!
//! Parses CLI flags, wires the concrete Host Adapters to the core's
//! traits, loads and validates the on-disk configuration, and runs the
//! Supervisor until a shutdown signal arrives. Modeled on the teacher's
//! `strata-agent` binary: one `#[tokio::main]`, a handful of spawned
//! tasks under a shared state handle, `tokio::select!` over `ctrl_c()`
//! for graceful shutdown.

mod adapters;
mod config;
mod ipc_server;
mod net_config;
mod stats;
mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use adapters::ipc_bus::UnixIpcBus;
use adapters::routing::MwanRoutingControl;
use adapters::uci::UciFileStore;
use config::DaemonConfig;
use supervisor::Supervisor;

/// Config error at startup: the operator must fix the config before the
/// daemon will run.
const EXIT_CONFIG_ERROR: i32 = 1;
/// A required host capability (config store, IPC bus) could not be reached.
const EXIT_HOST_UNAVAILABLE: i32 = 2;

/// Grace period for in-flight switches to settle before the process exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "autonomyd", about = "Multi-WAN failover and monitoring daemon")]
struct Cli {
    /// UCI-style config file holding the `autonomy`, `network` and
    /// multi-WAN policy packages.
    #[arg(long, default_value = "/etc/config/autonomy")]
    config: PathBuf,

    /// Unix socket for the host's request/response IPC bus (interface
    /// state, Wi-Fi scans, modem diagnostics).
    #[arg(long, default_value = "/var/run/ubus.sock")]
    bus_socket: PathBuf,

    /// Unix socket this daemon's own privileged control surface listens on.
    #[arg(long, default_value = "/var/run/autonomyd.sock")]
    control_socket: PathBuf,

    /// On-disk marker of the last member switched to, so `current_member`
    /// survives a daemon restart.
    #[arg(long, default_value = "/var/run/autonomyd.state")]
    state_file: PathBuf,

    /// Command used to apply a routing metric change, split on whitespace.
    #[arg(long, default_value = "mwan3 restart")]
    mwan_reload_cmd: String,

    /// Timeout for each host IPC bus round-trip, in seconds.
    #[arg(long, default_value_t = 3)]
    bus_timeout_s: u64,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    tracing::info!(
        pid = std::process::id(),
        config = %cli.config.display(),
        "autonomyd starting"
    );

    let config_store: Arc<dyn autonomy_core::host::ConfigStore> = match UciFileStore::load(&cli.config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "failed to load config store");
            std::process::exit(EXIT_HOST_UNAVAILABLE);
        }
    };

    let daemon_config = match DaemonConfig::load(&*config_store) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration, refusing to start");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let bus: Arc<dyn autonomy_core::host::IpcBus> = Arc::new(UnixIpcBus::new(
        cli.bus_socket.clone(),
        Duration::from_secs(cli.bus_timeout_s),
    ));

    let mwan_reload_cmd: Vec<String> = cli
        .mwan_reload_cmd
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    let routing = Arc::new(MwanRoutingControl::new(
        config_store.clone(),
        daemon_config.mwan_package.clone(),
        mwan_reload_cmd,
        cli.state_file.clone(),
    ));

    let supervisor = Supervisor::new(config_store, bus, routing, daemon_config);
    tracing::info!(mwan_package = %supervisor.mwan_package_name(), "supervisor ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ipc_tx, ipc_rx) = mpsc::channel(64);

    let control_socket = cli.control_socket.clone();
    let ipc_server_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::serve(control_socket, ipc_tx).await {
            tracing::error!(error = %e, "ipc server exited");
        }
    });

    let mut run_handle = tokio::spawn(supervisor.run(ipc_rx, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        result = &mut run_handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "supervisor task failed");
            }
            ipc_server_handle.abort();
            tracing::info!("autonomyd stopped");
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);
    ipc_server_handle.abort();
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut run_handle).await.is_err() {
        tracing::warn!("supervisor did not shut down within the grace period, aborting");
        run_handle.abort();
    }

    tracing::info!("autonomyd stopped");
    Ok(())
}
