//! Collectors (§4.C): one per class, each producing [`Sample`]s at the
//! cadence the Adaptive Sampler requests. Each collector fails locally —
//! a failed probe never aborts the process, only degrades the Sample.
//!
//! Per §9's "dynamic dispatch over collectors" redesign note, a collector
//! is a value implementing the narrow [`Collector`] capability; the
//! Supervisor owns the `class -> collector` mapping explicitly rather
//! than looking collectors up through a registry.

pub mod cellular;
pub mod generic;
pub mod starlink;
pub mod wifi;

use std::time::Duration;

use tokio::time::Instant;

use crate::model::{Member, Sample};

/// `collect(member, deadline) -> Sample`. Implementations must return a
/// Sample even on partial failure (absent fields, `quality = 0` on total
/// failure) so the Store's time axis never has collector-caused gaps.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, member: &Member, deadline: Duration) -> Sample;
}

/// Attempt a bare TCP connect to `host:port`, returning the elapsed time
/// on success. Used as the latency proxy for every collector that has no
/// richer protocol available.
pub(crate) async fn tcp_probe(
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<Duration, std::io::Error> {
    let start = Instant::now();
    let addr = format!("{host}:{port}");
    tokio::time::timeout(deadline, tokio::net::TcpStream::connect(&addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    Ok(start.elapsed())
}

/// Issue a minimal `GET` over a freshly opened TCP connection and return
/// the response body as bytes, bounded by `deadline`. Used for the
/// Starlink dish's HTTP fallback and generic HTTP probes — no HTTP
/// client crate is pulled in for this; the request/response framing is
/// simple enough to hand-roll and the response bodies are tolerated as
/// "unknown fields ignored" per the dish protocol contract.
pub(crate) async fn http_get(
    host: &str,
    port: u16,
    path: &str,
    deadline: Duration,
) -> Result<Vec<u8>, std::io::Error> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = format!("{host}:{port}");
    let mut stream = tokio::time::timeout(deadline, tokio::net::TcpStream::connect(&addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\nAccept: application/json\r\n\r\n"
    );

    tokio::time::timeout(deadline, stream.write_all(request.as_bytes()))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))??;

    let mut buf = Vec::new();
    tokio::time::timeout(deadline, stream.read_to_end(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"))??;

    let body_start = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .unwrap_or(0);
    Ok(buf.split_off(body_start))
}
