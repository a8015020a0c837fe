use axum::{
    Json,
    extract::rejection::JsonRejection,
    extract::{Path, State},
};
use serde_json::{Value, json};

use super::{json_body, workspace_id};
use crate::AppState;
use crate::error::HubResult;
use crate::models::ProcessInfo;
use crate::supervisor::SpawnRequest;

/// `POST /api/previews/{id}/execute`
///
/// Returns as soon as the process is running; output arrives over the
/// workspace WebSocket.
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<SpawnRequest>, JsonRejection>,
) -> HubResult<Json<ProcessInfo>> {
    let id = workspace_id(&id)?;
    let request = json_body(body)?;

    let session = state.registry.get_or_create(&id).await?;
    let info = state.supervisor.spawn(&session, request).await?;
    Ok(Json(info))
}

/// `GET /api/previews/{id}/processes`
pub async fn list_processes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HubResult<Json<Vec<ProcessInfo>>> {
    let id = workspace_id(&id)?;
    let session = state.registry.require(&id).await?;
    Ok(Json(state.supervisor.list(&session).await))
}

/// `DELETE /api/previews/{id}/processes/{pid}`
pub async fn kill_process(
    State(state): State<AppState>,
    Path((id, process_id)): Path<(String, String)>,
) -> HubResult<Json<Value>> {
    let id = workspace_id(&id)?;
    let session = state.registry.require(&id).await?;
    state.supervisor.kill(&session, &process_id).await?;
    Ok(Json(json!({ "ok": true, "processId": process_id })))
}
