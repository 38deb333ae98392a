//! Check runner: executes the probes configured for one application and
//! persists each outcome as an immutable check row.

use std::time::Duration;

use serde::Serialize;

use crate::db::{ApplicationTarget, CheckStatus, CheckType, Store};
use crate::probe::{self, ProbeOutcome};

/// One executed probe with its kind, as returned to manual-trigger callers.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub status: CheckStatus,
    pub response_time: i64,
    pub error_message: Option<String>,
}

/// Run every probe that applies to `app` and persist the outcomes.
///
/// Returns 0, 1, or 2 outcomes depending on which of port/health_url are
/// configured (`port` first when both are). The two probes run concurrently
/// and independently; persistence failures are logged, never propagated, and
/// do not affect the sibling outcome.
pub async fn run_checks(
    store: &Store,
    app: &ApplicationTarget,
    timeout: Duration,
) -> Vec<CheckOutcome> {
    let port_probe = async {
        match app.port {
            Some(port) => Some(probe::probe_port(&app.host, port, timeout).await),
            None => None,
        }
    };
    let health_probe = async {
        match app.health_url.as_deref() {
            Some(url) => Some(probe::probe_health(url, timeout).await),
            None => None,
        }
    };

    let (port_outcome, health_outcome) = tokio::join!(port_probe, health_probe);

    let mut outcomes = Vec::new();
    if let Some(outcome) = port_outcome {
        outcomes.push(record(store, app, CheckType::Port, outcome));
    }
    if let Some(outcome) = health_outcome {
        outcomes.push(record(store, app, CheckType::Health, outcome));
    }
    outcomes
}

fn record(
    store: &Store,
    app: &ApplicationTarget,
    check_type: CheckType,
    outcome: ProbeOutcome,
) -> CheckOutcome {
    if let Err(e) = store.insert_check(
        app.id,
        check_type,
        outcome.status,
        outcome.response_time_ms,
        outcome.error_message.as_deref(),
    ) {
        tracing::error!(
            "Failed to persist {} check for {}: {}",
            check_type.as_str(),
            app.name,
            e
        );
    }

    CheckOutcome {
        check_type,
        status: outcome.status,
        response_time: outcome.response_time_ms,
        error_message: outcome.error_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewApplication;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tempfile::NamedTempFile;

    async fn spawn_health_server(status: StatusCode) -> String {
        let app = Router::new().route("/health", get(move || async move { status }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/health", addr)
    }

    fn registered_target(
        store: &Store,
        name: &str,
        port: Option<u16>,
        health_url: Option<String>,
    ) -> ApplicationTarget {
        let server = store.add_server("test", "127.0.0.1").unwrap();
        let app = store
            .add_application(&NewApplication {
                server_id: server.id,
                name: name.to_string(),
                port,
                health_url,
                check_interval: 60,
                response_threshold: 4000,
            })
            .unwrap();
        store.get_application_target(app.id).unwrap()
    }

    #[tokio::test]
    async fn test_no_probes_configured_yields_no_outcomes() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let target = registered_target(&store, "bare", None, None);

        let outcomes = run_checks(&store, &target, Duration::from_secs(1)).await;
        assert!(outcomes.is_empty());
        assert_eq!(store.count_checks(target.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_port_only_yields_one_port_outcome() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _listener = listener;

        let target = registered_target(&store, "port-only", Some(port), None);
        let outcomes = run_checks(&store, &target, Duration::from_secs(5)).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].check_type, CheckType::Port);
        assert_eq!(outcomes[0].status, CheckStatus::Up);

        let rows = store.get_checks(target.id, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].check_type, CheckType::Port);
    }

    #[tokio::test]
    async fn test_health_only_yields_one_health_outcome() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let url = spawn_health_server(StatusCode::OK).await;

        let target = registered_target(&store, "health-only", None, Some(url));
        let outcomes = run_checks(&store, &target, Duration::from_secs(5)).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].check_type, CheckType::Health);
        assert_eq!(outcomes[0].status, CheckStatus::Up);
        assert_eq!(store.count_checks(target.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_both_probes_yield_two_persisted_outcomes() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _listener = listener;
        let url = spawn_health_server(StatusCode::OK).await;

        let target = registered_target(&store, "both", Some(port), Some(url));
        let outcomes = run_checks(&store, &target, Duration::from_secs(5)).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].check_type, CheckType::Port);
        assert_eq!(outcomes[1].check_type, CheckType::Health);
        assert!(outcomes.iter().all(|o| o.status == CheckStatus::Up));
        assert!(outcomes.iter().all(|o| o.response_time >= 0 && o.response_time < 5000));
        assert_eq!(store.count_checks(target.id).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_probe_is_recorded_as_down() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let url = spawn_health_server(StatusCode::SERVICE_UNAVAILABLE).await;

        let target = registered_target(&store, "failing", None, Some(url));
        let outcomes = run_checks(&store, &target, Duration::from_secs(5)).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, CheckStatus::Down);

        let rows = store.get_checks(target.id, 10).unwrap();
        assert_eq!(rows[0].status, CheckStatus::Down);
        assert!(rows[0].error_message.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_bad_target_does_not_suppress_sibling() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();

        // One application pointing nowhere, one with a live listener.
        let bad = registered_target(&store, "bad", None, Some("http://host.invalid/health".to_string()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _listener = listener;
        let good = registered_target(&store, "good", Some(port), None);

        let (bad_outcomes, good_outcomes) = tokio::join!(
            run_checks(&store, &bad, Duration::from_secs(2)),
            run_checks(&store, &good, Duration::from_secs(5)),
        );

        assert_eq!(bad_outcomes.len(), 1);
        assert_eq!(bad_outcomes[0].status, CheckStatus::Down);
        assert_eq!(good_outcomes.len(), 1);
        assert_eq!(good_outcomes[0].status, CheckStatus::Up);
        assert_eq!(store.count_checks(good.id).unwrap(), 1);
    }
}
