use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::workspace_id;
use crate::AppState;
use crate::ws;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Default target for terminal input on this connection
    pub process_id: Option<String>,
}

/// Workspace WebSocket - one connection per viewer
pub async fn preview_websocket_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let preview_id = match workspace_id(&id) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    ws.on_upgrade(move |socket| {
        ws::handle_preview_ws(socket, state, preview_id, query.process_id)
    })
}
