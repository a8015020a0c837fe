//! WebSocket Handler
//!
//! One task pair per connection: a writer draining the connection's outbound
//! queue into the socket, and a reader decoding inbound frames and
//! dispatching them against the workspace session.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::broadcast::ConnectionHandle;
use crate::config::ServerConfig;
use crate::error::HubError;
use crate::models::WorkspaceId;
use crate::session::Session;
use crate::supervisor::ProcessSupervisor;

use super::protocol::{ClientMessage, ServerMessage, decode_client_message, now_millis};

/// Everything the reader needs to act on one inbound message
struct Dispatch<'a> {
    conn: &'a ConnectionHandle,
    session: &'a Arc<Session>,
    supervisor: &'a ProcessSupervisor,
    server_config: &'a ServerConfig,
}

/// Serve a workspace WebSocket connection until the client goes away
pub async fn handle_preview_ws(
    socket: WebSocket,
    state: AppState,
    preview_id: WorkspaceId,
    subject_process_id: Option<String>,
) {
    let (conn, mut outbound) = ConnectionHandle::new(subject_process_id);
    let conn_id = conn.id;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (session, count) = match state.registry.attach(&preview_id, conn.clone()).await {
        Ok(attached) => attached,
        Err(e) => {
            error!(preview_id = %preview_id, "Failed to attach connection: {}", e);
            if let Some(frame) = crate::broadcast::encode(&ServerMessage::from_error(&e)) {
                let _ = ws_sender.send(Message::Text(frame)).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };

    info!(
        preview_id = %preview_id,
        conn_id = %conn_id,
        subject = ?conn.subject_process_id,
        clients = count,
        "WebSocket connection established"
    );

    // Task to send queued frames to the WebSocket
    let sender_task = async move {
        while let Some(frame) = outbound.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming messages
    let dispatch = Dispatch {
        conn: &conn,
        session: &session,
        supervisor: &state.supervisor,
        server_config: &state.server_config,
    };
    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => dispatch.handle_text(text.as_str()).await,
                Ok(Message::Binary(_)) => {
                    dispatch.reject(&HubError::InvalidArgument(
                        "binary frames are not supported".into(),
                    ));
                }
                Ok(Message::Close(_)) => break,
                // ping/pong are answered by the transport
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %conn_id, "WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %conn_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %conn_id, "Input task ended"),
    }

    let remaining = state.registry.detach(&session, &conn_id).await;
    info!(
        preview_id = %preview_id,
        conn_id = %conn_id,
        remaining,
        "WebSocket connection closed"
    );
}

impl Dispatch<'_> {
    async fn handle_text(&self, text: &str) {
        let msg = match decode_client_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id = %self.conn.id, "Rejecting inbound message: {}", e);
                self.reject(&e);
                return;
            }
        };

        let preview_id = self.session.id.to_string();
        match msg {
            ClientMessage::FileChange { path } => {
                debug!(preview_id = %preview_id, path = ?path, "Client reported file change");
                self.session
                    .broadcast(&ServerMessage::RefreshPreview { preview_id })
                    .await;
            }
            ClientMessage::PreviewReady { .. } => {
                let url = self.server_config.preview_url(&preview_id);
                self.session
                    .broadcast(&ServerMessage::PreviewReady {
                        preview_id,
                        url,
                        timestamp: now_millis(),
                    })
                    .await;
            }
            ClientMessage::TerminalInput { process_id, input } => {
                if let Some(process_id) = self.target(process_id) {
                    self.supervisor
                        .write_input(self.session, &process_id, &input)
                        .await;
                }
            }
            ClientMessage::TerminalResize {
                process_id,
                cols,
                rows,
            } => {
                if let Some(process_id) = self.target(process_id) {
                    self.supervisor
                        .resize(self.session, &process_id, cols, rows)
                        .await;
                }
            }
        }
    }

    /// Explicit `processId`, else the connection's subject process
    fn target(&self, process_id: Option<String>) -> Option<String> {
        let target = process_id.or_else(|| self.conn.subject_process_id.clone());
        if target.is_none() {
            self.reject(&HubError::InvalidArgument("processId is required".into()));
        }
        target
    }

    /// Report an error to this connection only
    fn reject(&self, err: &HubError) {
        if !self.conn.send_to(&ServerMessage::from_error(err)) {
            warn!(conn_id = %self.conn.id, "Failed to send error - connection closed");
        }
    }
}
