//! Probe module for application monitoring.
//!
//! Supports TCP port reachability and HTTP health probes. Probes never fail
//! as functions: every failure mode (timeout, refusal, DNS error, bad HTTP
//! status) is captured as a `down` outcome with a human-readable reason.

mod http;
mod tcp;

pub use http::*;
pub use tcp::*;

use crate::db::CheckStatus;
use std::time::Duration;

/// The result of one probe: status, latency, optional error detail.
///
/// `response_time_ms` is wall-clock time from dispatch to resolution and is
/// reported on failure too.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: CheckStatus,
    pub response_time_ms: i64,
    pub error_message: Option<String>,
}

impl ProbeOutcome {
    fn up(elapsed: Duration) -> Self {
        Self {
            status: CheckStatus::Up,
            response_time_ms: elapsed.as_millis() as i64,
            error_message: None,
        }
    }

    fn down(elapsed: Duration, reason: String) -> Self {
        Self {
            status: CheckStatus::Down,
            response_time_ms: elapsed.as_millis() as i64,
            error_message: Some(reason),
        }
    }
}
