//! TCP reachability probe.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use super::ProbeOutcome;

/// Probe TCP reachability of `host:port`.
///
/// Attempts a connection within `timeout`. DNS resolution failures, refused
/// connections and timeouts all resolve to a `down` outcome.
pub async fn probe_port(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let addr = format!("{}:{}", host, port);
    let start = Instant::now();

    match tokio::time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
        Ok(Ok(_stream)) => ProbeOutcome::up(start.elapsed()),
        Ok(Err(e)) => ProbeOutcome::down(
            start.elapsed(),
            format!("Port {} unreachable: {}", port, e),
        ),
        Err(_) => ProbeOutcome::down(
            start.elapsed(),
            format!(
                "Port {} unreachable: connect timed out after {}ms",
                port,
                timeout.as_millis()
            ),
        ),
    }
}
