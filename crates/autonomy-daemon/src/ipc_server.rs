//! The daemon's own privileged IPC surface (§6): `status`, `members`,
//! `metrics{member?}`, `events{since?, limit?}` are informational;
//! `failover{member, reason}`, `restore`, `recheck`, `reload` are
//! privileged control requests. Same line-delimited JSON-over-Unix-socket
//! shape as the host's own IPC bus (see [`crate::adapters::ipc_bus`]) and
//! the teacher's hot-swap control socket
//! (`strata-gst::bin::strata_node::run_control_socket`), ported to
//! `tokio` since this server lives inside the daemon's async runtime.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};

/// A parsed, privileged-or-not request from an IPC client.
#[derive(Debug)]
pub enum IpcRequest {
    Status,
    Members,
    Metrics { member: Option<String> },
    Events { since: Option<DateTime<Utc>>, limit: usize },
    Failover { member: String, reason: String },
    Restore,
    Recheck,
    Reload,
}

pub struct IpcCall {
    pub request: IpcRequest,
    pub reply: oneshot::Sender<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireRequest {
    cmd: String,
    #[serde(default)]
    member: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: Option<usize>,
}

fn parse_request(wire: WireRequest) -> Result<IpcRequest, String> {
    match wire.cmd.as_str() {
        "status" => Ok(IpcRequest::Status),
        "members" => Ok(IpcRequest::Members),
        "metrics" => Ok(IpcRequest::Metrics { member: wire.member }),
        "events" => Ok(IpcRequest::Events {
            since: wire.since,
            limit: wire.limit.unwrap_or(50),
        }),
        "failover" => {
            let member = wire.member.ok_or("failover requires `member`")?;
            Ok(IpcRequest::Failover {
                member,
                reason: wire.reason.unwrap_or_else(|| "operator_requested".to_string()),
            })
        }
        "restore" => Ok(IpcRequest::Restore),
        "recheck" => Ok(IpcRequest::Recheck),
        "reload" => Ok(IpcRequest::Reload),
        other => Err(format!("unknown command `{other}`")),
    }
}

/// Binds `socket_path` and forwards every well-formed request to `tx`,
/// writing back whatever the handler sends through the reply channel.
/// Runs until the process exits; callers spawn this as its own task.
pub async fn serve(socket_path: impl AsRef<Path>, tx: mpsc::Sender<IpcCall>) -> anyhow::Result<()> {
    let socket_path = socket_path.as_ref();
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "ipc server listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, tx).await {
                tracing::debug!(error = %e, "ipc connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    tx: mpsc::Sender<IpcCall>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WireRequest>(line).map_err(|e| e.to_string()).and_then(parse_request) {
            Ok(request) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if tx.send(IpcCall { request, reply: reply_tx }).await.is_err() {
                    serde_json::json!({"ok": false, "error": "supervisor unavailable"})
                } else {
                    match reply_rx.await {
                        Ok(value) => value,
                        Err(_) => serde_json::json!({"ok": false, "error": "handler dropped the reply"}),
                    }
                }
            }
            Err(e) => serde_json::json!({"ok": false, "error": e}),
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        write_half.write_all(&out).await?;
    }
    Ok(())
}

/// Convenience for handlers: wraps a successful payload as `{"ok":
/// true, "result": ...}`, matching the shape [`crate::adapters::ipc_bus`]
/// expects on the other side of the same protocol.
pub fn ok(result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "ok": true, "result": result })
}

pub fn err(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "ok": false, "error": message.into() })
}

#[allow(dead_code)]
pub type SharedCounters = Arc<crate::stats::Counters>;
