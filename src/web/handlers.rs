//! HTTP request handlers.

use super::AppState;
use crate::checker;
use crate::db::{
    Application, ApplicationStatus, DashboardSummary, DbError, NewApplication, RecentCheck, Server,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

fn db_error_response(e: DbError) -> axum::response::Response {
    match e {
        DbError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

// ============================================================================
// Health
// ============================================================================

/// Liveness of the monitor itself.
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

// ============================================================================
// API: Servers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
}

pub async fn handle_get_servers(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_servers() {
        Ok(servers) => Json(servers).into_response(),
        Err(e) => db_error_response(e),
    }
}

#[derive(Debug, Serialize)]
pub struct ServerDetail {
    #[serde(flatten)]
    pub server: Server,
    pub applications: Vec<ApplicationStatus>,
}

pub async fn handle_get_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let server = match state.store.get_server(id) {
        Ok(s) => s,
        Err(e) => return db_error_response(e),
    };

    match state.store.get_applications_for_server(id) {
        Ok(applications) => Json(ServerDetail {
            server,
            applications,
        })
        .into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_create_server(
    State(state): State<AppState>,
    Json(req): Json<ServerRequest>,
) -> impl IntoResponse {
    if req.name.is_empty() || req.host.is_empty() {
        return (StatusCode::BAD_REQUEST, "Name and host are required").into_response();
    }

    match state.store.add_server(&req.name, &req.host) {
        Ok(server) => Json(server).into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_update_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ServerRequest>,
) -> impl IntoResponse {
    if req.name.is_empty() || req.host.is_empty() {
        return (StatusCode::BAD_REQUEST, "Name and host are required").into_response();
    }

    match state.store.update_server(id, &req.name, &req.host) {
        Ok(()) => match state.store.get_server(id) {
            Ok(server) => Json(server).into_response(),
            Err(e) => db_error_response(e),
        },
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_delete_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_server(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error_response(e),
    }
}

// ============================================================================
// API: Applications
// ============================================================================

fn default_check_interval() -> u32 {
    60
}

fn default_response_threshold() -> u32 {
    4000
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub server_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval: u32,
    #[serde(default = "default_response_threshold")]
    pub response_threshold: u32,
}

pub async fn handle_create_application(
    State(state): State<AppState>,
    Json(req): Json<CreateApplicationRequest>,
) -> impl IntoResponse {
    if req.server_id <= 0 || req.name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Server ID and name are required").into_response();
    }

    if let Err(e) = state.store.get_server(req.server_id) {
        return match e {
            DbError::NotFound => (StatusCode::BAD_REQUEST, "Server not found").into_response(),
            other => db_error_response(other),
        };
    }

    let new_app = NewApplication {
        server_id: req.server_id,
        name: req.name,
        port: req.port,
        health_url: req.health_url,
        check_interval: req.check_interval,
        response_threshold: req.response_threshold,
    };

    match state.store.add_application(&new_app) {
        Ok(app) => Json(app).into_response(),
        Err(e) => db_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateApplicationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval: u32,
    #[serde(default = "default_response_threshold")]
    pub response_threshold: u32,
}

pub async fn handle_update_application(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateApplicationRequest>,
) -> impl IntoResponse {
    if req.name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Name is required").into_response();
    }

    // Applications cannot move between servers; keep the existing owner.
    let existing: Application = match state.store.get_application(id) {
        Ok(app) => app,
        Err(e) => return db_error_response(e),
    };

    let updated = NewApplication {
        server_id: existing.server_id,
        name: req.name,
        port: req.port,
        health_url: req.health_url,
        check_interval: req.check_interval,
        response_threshold: req.response_threshold,
    };

    match state.store.update_application(id, &updated) {
        Ok(()) => match state.store.get_application(id) {
            Ok(app) => Json(app).into_response(),
            Err(e) => db_error_response(e),
        },
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_delete_application(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.store.delete_application(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error_response(e),
    }
}

// ============================================================================
// API: Checks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChecksQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

pub async fn handle_get_checks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ChecksQuery>,
) -> impl IntoResponse {
    // 404 for unknown applications rather than an empty list.
    if let Err(e) = state.store.get_application(id) {
        return db_error_response(e);
    }

    let limit = query.limit.unwrap_or(50);
    match state.store.get_checks(id, limit) {
        Ok(checks) => Json(checks).into_response(),
        Err(e) => db_error_response(e),
    }
}

/// Manual "check now" trigger. Runs the application's probes synchronously,
/// persists the outcomes like any scheduled check, and returns them. May race
/// a concurrently scheduled check; both persist their own rows.
pub async fn handle_run_check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let target = match state.store.get_application_target(id) {
        Ok(target) => target,
        Err(e) => return db_error_response(e),
    };

    let outcomes =
        checker::run_checks(&state.store, &target, state.config.probe_timeout()).await;
    Json(outcomes).into_response()
}

// ============================================================================
// API: Dashboard
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub summary: DashboardSummary,
    pub recent_checks: Vec<RecentCheck>,
}

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let summary = match state.store.get_dashboard_summary() {
        Ok(summary) => summary,
        Err(e) => return db_error_response(e),
    };

    match state.store.get_recent_checks(20) {
        Ok(recent_checks) => Json(DashboardResponse {
            summary,
            recent_checks,
        })
        .into_response(),
        Err(e) => db_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::Store;
    use axum::routing::{get, post};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    /// Serve the API routes on an ephemeral port, returning the base URL.
    async fn spawn_api(tmp: &NamedTempFile) -> String {
        let state = AppState {
            config: ServerConfig::default(),
            store: Arc::new(Store::new(tmp.path()).unwrap()),
        };
        let router = axum::Router::new()
            .route("/api/health", get(handle_health))
            .route("/api/servers", post(handle_create_server))
            .route("/api/servers/{id}", get(handle_get_server))
            .route("/api/applications", post(handle_create_application))
            .route("/api/applications/{id}/checks", get(handle_get_checks))
            .route("/api/dashboard", get(handle_dashboard))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let tmp = NamedTempFile::new().unwrap();
        let base = spawn_api(&tmp).await;

        let response = reqwest::get(format!("{}/api/health", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_server_requires_name_and_host() {
        let tmp = NamedTempFile::new().unwrap();
        let base = spawn_api(&tmp).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/servers", base))
            .json(&serde_json::json!({"name": "", "host": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_application_rejects_unknown_server() {
        let tmp = NamedTempFile::new().unwrap();
        let base = spawn_api(&tmp).await;

        let response = reqwest::Client::new()
            .post(format!("{}/api/applications", base))
            .json(&serde_json::json!({"server_id": 42, "name": "api"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_404() {
        let tmp = NamedTempFile::new().unwrap();
        let base = spawn_api(&tmp).await;

        let response = reqwest::get(format!("{}/api/servers/7", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        let response = reqwest::get(format!("{}/api/applications/7/checks", base))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_and_fetch_flow() {
        let tmp = NamedTempFile::new().unwrap();
        let base = spawn_api(&tmp).await;
        let client = reqwest::Client::new();

        let server: serde_json::Value = client
            .post(format!("{}/api/servers", base))
            .json(&serde_json::json!({"name": "Web", "host": "web.internal"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let server_id = server["id"].as_i64().unwrap();

        let created: serde_json::Value = client
            .post(format!("{}/api/applications", base))
            .json(&serde_json::json!({"server_id": server_id, "name": "api", "port": 8082}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(created["check_interval"], 60);

        let detail: serde_json::Value = client
            .get(format!("{}/api/servers/{}", base, server_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(detail["applications"].as_array().unwrap().len(), 1);

        let dashboard: serde_json::Value = client
            .get(format!("{}/api/dashboard", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(dashboard["summary"]["total_applications"], 1);
        assert_eq!(dashboard["summary"]["total_servers"], 1);
    }
}
