//! WebSocket Protocol Types
//!
//! Message types for client-server communication over a workspace connection.
//! Both directions are JSON objects tagged by `type` with camelCase fields.

use proc_manager::OutputStream;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Stream name carried on `process-output` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl From<OutputStream> for StreamName {
    fn from(stream: OutputStream) -> Self {
        match stream {
            OutputStream::Stdout => StreamName::Stdout,
            OutputStream::Stderr => StreamName::Stderr,
        }
    }
}

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// A client changed a file through some other channel; viewers should reload
    FileChange {
        #[serde(default)]
        path: Option<String>,
    },
    /// The client's preview finished building
    PreviewReady {
        #[serde(default)]
        url: Option<String>,
    },
    /// Keystrokes for an interactive process. Falls back to the connection's
    /// subject process when `processId` is omitted.
    TerminalInput {
        #[serde(default)]
        process_id: Option<String>,
        input: String,
    },
    TerminalResize {
        #[serde(default)]
        process_id: Option<String>,
        cols: u16,
        rows: u16,
    },
}

/// Decode an inbound text frame.
///
/// Missing or non-string tags, unknown tags and missing fields all surface as
/// `InvalidArgument` so the caller can answer with an `error` event.
pub fn decode_client_message(text: &str) -> HubResult<ClientMessage> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| HubError::InvalidArgument(format!("malformed message: {e}")))?;

    match value.get("type") {
        Some(serde_json::Value::String(_)) => {}
        Some(_) => {
            return Err(HubError::InvalidArgument(
                "message type must be a string".into(),
            ));
        }
        None => {
            return Err(HubError::InvalidArgument(
                "message is missing its type".into(),
            ));
        }
    }

    serde_json::from_value(value)
        .map_err(|e| HubError::InvalidArgument(format!("invalid message: {e}")))
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Ack sent to a connection right after it attaches
    ConnectionEstablished {
        preview_id: String,
        timestamp: i64,
        client_count: usize,
    },
    /// A file in the workspace was written or removed
    FileChange { preview_id: String, path: String },
    RefreshPreview { preview_id: String },
    PreviewReady {
        preview_id: String,
        url: String,
        timestamp: i64,
    },
    /// Incremental output chunk
    ProcessOutput {
        preview_id: String,
        process_id: String,
        output: String,
        stream: StreamName,
    },
    /// Terminal event for a process; `stdout`/`stderr` are only filled for one-shot runs
    ProcessCompleted {
        preview_id: String,
        process_id: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn from_error(err: &HubError) -> Self {
        ServerMessage::Error {
            error: err.kind().to_string(),
            message: Some(err.to_string()),
            timestamp: now_millis(),
        }
    }
}
