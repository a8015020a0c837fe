pub mod execute;
pub mod files;
pub mod health;
pub mod preview;
pub mod websocket;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};

use crate::error::{HubError, HubResult};
use crate::models::WorkspaceId;

// Re-export all handlers for easy route registration
pub use execute::{execute, kill_process, list_processes};
pub use files::{list_files, make_directory, read_file, remove_file, write_file};
pub use health::health_handler;
pub use preview::{serve_preview_file, serve_preview_root};
pub use websocket::preview_websocket_handler;

fn workspace_id(raw: &str) -> HubResult<WorkspaceId> {
    WorkspaceId::parse(raw)
}

/// Unwrap a JSON body, reporting rejections with the hub's error body
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> HubResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| HubError::InvalidArgument(e.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> HubResult<T> {
    query
        .map(|Query(value)| value)
        .map_err(|e| HubError::InvalidArgument(e.body_text()))
}
