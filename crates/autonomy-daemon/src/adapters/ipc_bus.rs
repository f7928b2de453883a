//! IPC bus (§4.A) client: runtime interface state, Wi-Fi scans and modem
//! diagnostics, all read over the host's request/response IPC bus (the
//! OpenWrt `ubus` equivalent). One line-delimited JSON request per call,
//! mirroring the hot-swap control protocol the teacher's pipeline node
//! speaks on its own Unix socket — no long-lived streams, per §4.A.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use autonomy_core::error::HostAdapterError;
use autonomy_core::host::{InterfaceState, IpcBus, ModemStatus, WifiScanResult};
use serde::Deserialize;

fn unavailable(reason: impl Into<String>) -> HostAdapterError {
    HostAdapterError::Unavailable {
        capability: "ipc_bus".to_string(),
        reason: reason.into(),
    }
}

/// Talks to the host's IPC bus over a Unix domain socket at `socket_path`.
pub struct UnixIpcBus {
    socket_path: PathBuf,
    timeout: Duration,
}

impl UnixIpcBus {
    pub fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        UnixIpcBus { socket_path, timeout }
    }

    fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, HostAdapterError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .map_err(|e| unavailable(format!("connecting to {}: {e}", self.socket_path.display())))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| unavailable(format!("setting read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| unavailable(format!("setting write timeout: {e}")))?;

        let request = serde_json::json!({ "method": method, "params": params });
        let mut line = serde_json::to_vec(&request)
            .map_err(|e| unavailable(format!("encoding request: {e}")))?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .map_err(|e| unavailable(format!("writing request: {e}")))?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .map_err(|e| unavailable(format!("reading response: {e}")))?;
        if response_line.is_empty() {
            return Err(unavailable("bus closed the connection without a response"));
        }

        let response: BusResponse = serde_json::from_str(&response_line)
            .map_err(|e| unavailable(format!("decoding response: {e}")))?;
        if !response.ok {
            return Err(HostAdapterError::Rejected {
                capability: "ipc_bus".to_string(),
                reason: response.error.unwrap_or_else(|| "bus call failed".to_string()),
            });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Deserialize)]
struct BusResponse {
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireInterfaceState {
    #[serde(default)]
    up: bool,
    #[serde(default)]
    available: bool,
    #[serde(default)]
    l3_device: Option<String>,
    #[serde(default)]
    ipv4_addresses: Vec<String>,
    #[serde(default)]
    uptime_s: Option<u64>,
}

#[derive(Deserialize)]
struct WireWifiScanResult {
    channel: u32,
    signal_dbm: f64,
    #[serde(default)]
    noise_dbm: Option<f64>,
}

#[derive(Deserialize, Default)]
struct WireModemStatus {
    #[serde(default)]
    rsrp_dbm: Option<f64>,
    #[serde(default)]
    rsrq_db: Option<f64>,
    #[serde(default)]
    sinr_db: Option<f64>,
    #[serde(default)]
    cell_id: Option<u64>,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    roaming: bool,
}

impl IpcBus for UnixIpcBus {
    fn interface_state(&self, logical_interface: &str) -> Result<InterfaceState, HostAdapterError> {
        let result = self.call(
            "network.interface.status",
            serde_json::json!({ "interface": logical_interface }),
        )?;
        let wire: WireInterfaceState = serde_json::from_value(result)
            .map_err(|e| unavailable(format!("malformed interface_state reply: {e}")))?;
        Ok(InterfaceState {
            up: wire.up,
            available: wire.available,
            l3_device: wire.l3_device,
            ipv4_addresses: wire.ipv4_addresses,
            uptime_s: wire.uptime_s,
        })
    }

    fn wifi_scan(&self, iface: &str) -> Result<Vec<WifiScanResult>, HostAdapterError> {
        let result = self.call("iwinfo.scan", serde_json::json!({ "device": iface }))?;
        let wire: Vec<WireWifiScanResult> = serde_json::from_value(result)
            .map_err(|e| unavailable(format!("malformed wifi_scan reply: {e}")))?;
        Ok(wire
            .into_iter()
            .map(|r| WifiScanResult {
                channel: r.channel,
                signal_dbm: r.signal_dbm,
                noise_dbm: r.noise_dbm,
            })
            .collect())
    }

    fn modem_status(&self, iface: &str) -> Result<ModemStatus, HostAdapterError> {
        let result = self.call("modemmanager.status", serde_json::json!({ "device": iface }))?;
        let wire: WireModemStatus = serde_json::from_value(result)
            .map_err(|e| unavailable(format!("malformed modem_status reply: {e}")))?;
        Ok(ModemStatus {
            rsrp_dbm: wire.rsrp_dbm,
            rsrq_db: wire.rsrq_db,
            sinr_db: wire.sinr_db,
            cell_id: wire.cell_id,
            operator: wire.operator,
            roaming: wire.roaming,
        })
    }

    fn publish_status(&self, json: &serde_json::Value) -> Result<(), HostAdapterError> {
        self.call("autonomy.status", json.clone()).map(|_| ())
    }

    fn publish_event(&self, json: &serde_json::Value) -> Result<(), HostAdapterError> {
        self.call("autonomy.event", json.clone()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;

    fn spawn_echo_server(path: PathBuf, response: &'static str) {
        let listener = UnixListener::bind(&path).unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
    }

    #[test]
    fn interface_state_round_trips_over_the_socket() {
        let path = std::env::temp_dir().join(format!("autonomy-ipc-test-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        spawn_echo_server(
            path.clone(),
            "{\"ok\":true,\"result\":{\"up\":true,\"available\":true,\"ipv4_addresses\":[\"10.0.0.2\"]}}\n",
        );
        std::thread::sleep(Duration::from_millis(50));

        let bus = UnixIpcBus::new(path.clone(), Duration::from_secs(2));
        let state = bus.interface_state("wan1").unwrap();
        assert!(state.up);
        assert_eq!(state.ipv4_addresses, vec!["10.0.0.2".to_string()]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn bus_rejection_surfaces_as_rejected_error() {
        let path = std::env::temp_dir().join(format!("autonomy-ipc-test-reject-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        spawn_echo_server(path.clone(), "{\"ok\":false,\"error\":\"no such interface\"}\n");
        std::thread::sleep(Duration::from_millis(50));

        let bus = UnixIpcBus::new(path.clone(), Duration::from_secs(2));
        let err = bus.interface_state("ghost").unwrap_err();
        assert!(matches!(err, HostAdapterError::Rejected { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
