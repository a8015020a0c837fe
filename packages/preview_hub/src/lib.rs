//! Preview Hub - live multi-viewer workspaces
//!
//! A workspace is a directory on disk plus a [`session::Session`] holding the
//! viewers attached to it, a file cache and the processes running inside it.
//! Everything that happens in a workspace (file writes, process output,
//! preview notifications) is fanned out to all of its viewers.

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod broadcast;
pub mod config;
pub mod error;
pub mod files;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod ws;

#[cfg(test)]
mod test_helpers;

use crate::config::{HubConfig, ServerConfig};
use crate::registry::SessionRegistry;
use crate::supervisor::ProcessSupervisor;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub supervisor: Arc<ProcessSupervisor>,
    /// Server runtime configuration
    pub server_config: Arc<ServerConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &HubConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            config.workspace.root.clone(),
            config.workspace.idle_grace,
        ));
        let supervisor = Arc::new(ProcessSupervisor::new(
            registry.clone(),
            config.supervisor.clone(),
        ));
        Self {
            registry,
            supervisor,
            server_config: Arc::new(config.server.clone()),
            started_at: Instant::now(),
        }
    }

    /// Kill every process and stop all idle timers
    pub async fn shutdown(&self) {
        self.supervisor.shutdown_all().await;
        self.registry.shutdown().await;
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/previews/{id}/ws",
            get(handlers::preview_websocket_handler),
        )
        .route(
            "/api/previews/{id}/files",
            get(handlers::read_file)
                .put(handlers::write_file)
                .delete(handlers::remove_file),
        )
        .route("/api/previews/{id}/files/list", get(handlers::list_files))
        .route("/api/previews/{id}/files/mkdir", post(handlers::make_directory))
        .route("/api/previews/{id}/execute", post(handlers::execute))
        .route("/api/previews/{id}/processes", get(handlers::list_processes))
        .route(
            "/api/previews/{id}/processes/{pid}",
            delete(handlers::kill_process),
        )
        .route("/preview/{id}", get(handlers::serve_preview_root))
        .route("/preview/{id}/", get(handlers::serve_preview_root))
        .route("/preview/{id}/{*path}", get(handlers::serve_preview_file))
        .route("/health", get(handlers::health_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
