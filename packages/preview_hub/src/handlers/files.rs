use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{json_body, query_params, workspace_id};
use crate::AppState;
use crate::error::{HubError, HubResult};
use crate::files::{self, RelPath};

#[derive(Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct FilePathQuery {
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct RemoveQuery {
    pub path: Option<String>,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Deserialize)]
pub struct MkdirRequest {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

fn required_path(path: Option<String>) -> HubResult<RelPath> {
    match path {
        Some(raw) if !raw.is_empty() => RelPath::parse(&raw),
        _ => Err(HubError::InvalidArgument("path is required".into())),
    }
}

/// `PUT /api/previews/{id}/files`
pub async fn write_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<WriteFileRequest>, JsonRejection>,
) -> HubResult<Json<Value>> {
    let id = workspace_id(&id)?;
    let req = json_body(body)?;
    let path = RelPath::parse(&req.path)?;

    let session = state.registry.get_or_create(&id).await?;
    files::write(&session, &path, req.content).await?;

    Ok(Json(json!({ "ok": true, "path": path.as_str() })))
}

/// `GET /api/previews/{id}/files?path=`
pub async fn read_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<FilePathQuery>, QueryRejection>,
) -> HubResult<Json<Value>> {
    let id = workspace_id(&id)?;
    let path = required_path(query_params(query)?.path)?;

    let session = state.registry.require(&id).await?;
    let content = files::read(&session, &path).await?;

    Ok(Json(json!({ "path": path.as_str(), "content": content })))
}

/// `DELETE /api/previews/{id}/files?path=&recursive=`
pub async fn remove_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<RemoveQuery>, QueryRejection>,
) -> HubResult<Json<Value>> {
    let id = workspace_id(&id)?;
    let query = query_params(query)?;
    let path = required_path(query.path)?;

    let session = state.registry.require(&id).await?;
    files::remove(&session, &path, query.recursive).await?;

    Ok(Json(json!({ "ok": true, "path": path.as_str() })))
}

/// `GET /api/previews/{id}/files/list?path=`
pub async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<FilePathQuery>, QueryRejection>,
) -> HubResult<Json<Value>> {
    let id = workspace_id(&id)?;
    let path = match query_params(query)?.path {
        Some(raw) => RelPath::parse(&raw)?,
        None => RelPath::root(),
    };

    let session = state.registry.require(&id).await?;
    let entries = files::list_directory(&session, &path).await?;

    Ok(Json(json!({ "path": path.to_string(), "entries": entries })))
}

/// `POST /api/previews/{id}/files/mkdir`
pub async fn make_directory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MkdirRequest>, JsonRejection>,
) -> HubResult<Json<Value>> {
    let id = workspace_id(&id)?;
    let req = json_body(body)?;
    let path = RelPath::parse(&req.path)?;

    let session = state.registry.get_or_create(&id).await?;
    files::mkdir(&session, &path, req.recursive).await?;

    Ok(Json(json!({ "ok": true, "path": path.as_str() })))
}
