//! Host Adapter interfaces (§4.A).
//!
//! Three narrow capabilities the core depends on. The core never talks
//! to UCI, `ip`, or a Unix socket directly — it holds trait objects and
//! the daemon crate supplies the concrete implementations. This is the
//! seam that keeps `autonomy-core` free of process/host I/O and makes
//! every downstream component unit-testable against an in-memory fake.

use std::collections::HashMap;

use crate::error::HostAdapterError;

/// Key-value hierarchical config store (the host's UCI-style router
/// config). Used to read operator weights, daemon thresholds, and
/// per-member overrides. Never written by the core except through an
/// explicit operator-initiated command path.
pub trait ConfigStore: Send + Sync {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, HostAdapterError>;
    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), HostAdapterError>;
    fn commit(&self, package: &str) -> Result<(), HostAdapterError>;
    /// All keys under a package, e.g. every `member.<name>.*` entry.
    fn show(&self, package: &str) -> Result<HashMap<String, String>, HostAdapterError>;
}

/// A single routing member as the host router's policy layer sees it.
#[derive(Debug, Clone)]
pub struct RoutingMember {
    pub name: String,
    pub logical_interface: String,
}

/// Policy-routing control: make a member the active uplink.
pub trait RoutingControl: Send + Sync {
    fn list_members(&self) -> Result<Vec<RoutingMember>, HostAdapterError>;
    fn current_member(&self) -> Result<Option<String>, HostAdapterError>;
    /// Reprogram the host's policy-routing tables so `to` is primary.
    /// Synchronous and idempotent when `from == to`.
    fn switch(&self, from: Option<&str>, to: &str) -> Result<(), HostAdapterError>;
}

/// Live runtime state of a logical interface, as read over the host IPC
/// bus (`ubus`-equivalent).
#[derive(Debug, Clone, Default)]
pub struct InterfaceState {
    pub up: bool,
    pub available: bool,
    pub l3_device: Option<String>,
    pub ipv4_addresses: Vec<String>,
    pub uptime_s: Option<u64>,
}

/// Request/response IPC bus: query runtime interface state, publish
/// status/events. No long-lived streams required.
pub trait IpcBus: Send + Sync {
    fn interface_state(&self, logical_interface: &str) -> Result<InterfaceState, HostAdapterError>;
    /// Wi-Fi scan results as `(bssid-or-channel-key, signal_dbm)` pairs,
    /// used by the Wi-Fi collector.
    fn wifi_scan(&self, iface: &str) -> Result<Vec<WifiScanResult>, HostAdapterError>;
    /// Modem diagnostics (RSRP/RSRQ/SINR, serving cell, operator, roaming),
    /// used by the cellular collector. Goes through the bus rather than a
    /// direct QMI/MBIM/AT session, since the host's modem manager is the
    /// component that already owns that channel.
    fn modem_status(&self, iface: &str) -> Result<ModemStatus, HostAdapterError>;
    fn publish_status(&self, json: &serde_json::Value) -> Result<(), HostAdapterError>;
    fn publish_event(&self, json: &serde_json::Value) -> Result<(), HostAdapterError>;
}

#[derive(Debug, Clone)]
pub struct WifiScanResult {
    pub channel: u32,
    pub signal_dbm: f64,
    pub noise_dbm: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ModemStatus {
    pub rsrp_dbm: Option<f64>,
    pub rsrq_db: Option<f64>,
    pub sinr_db: Option<f64>,
    pub cell_id: Option<u64>,
    pub operator: Option<String>,
    pub roaming: bool,
}
