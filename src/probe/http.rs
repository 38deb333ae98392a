//! HTTP health probe.

use std::time::{Duration, Instant};

use super::ProbeOutcome;

/// Probe an HTTP health endpoint.
///
/// Issues a GET with `timeout`. Only a 200 response counts as up; redirects
/// are not followed, so 3xx classifies as down like any other non-200 status.
/// The response body is not read.
pub async fn probe_health(url: &str, timeout: Duration) -> ProbeOutcome {
    let url = normalize_url(url);
    let start = Instant::now();

    let client = match reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(client) => client,
        Err(e) => return ProbeOutcome::down(start.elapsed(), e.to_string()),
    };

    match client.get(&url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => {
            ProbeOutcome::up(start.elapsed())
        }
        Ok(response) => ProbeOutcome::down(
            start.elapsed(),
            format!("HTTP {}: Expected 200", response.status().as_u16()),
        ),
        Err(e) if e.is_timeout() => ProbeOutcome::down(
            start.elapsed(),
            format!("Request timed out after {}ms", timeout.as_millis()),
        ),
        Err(e) => ProbeOutcome::down(start.elapsed(), e.to_string()),
    }
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}
