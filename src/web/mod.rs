//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
}

/// Web server for PulseCheck.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self {
            state: AppState { config, store },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/health", get(handlers::handle_health))
            // Servers
            .route("/api/servers", get(handlers::handle_get_servers))
            .route("/api/servers", post(handlers::handle_create_server))
            .route("/api/servers/{id}", get(handlers::handle_get_server))
            .route("/api/servers/{id}", put(handlers::handle_update_server))
            .route("/api/servers/{id}", delete(handlers::handle_delete_server))
            // Applications
            .route("/api/applications", post(handlers::handle_create_application))
            .route("/api/applications/{id}", put(handlers::handle_update_application))
            .route("/api/applications/{id}", delete(handlers::handle_delete_application))
            .route("/api/applications/{id}/checks", get(handlers::handle_get_checks))
            .route("/api/applications/{id}/check", post(handlers::handle_run_check))
            // Dashboard
            .route("/api/dashboard", get(handlers::handle_dashboard))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port. Returns once a shutdown
    /// signal (ctrl-c) arrives.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }
}
