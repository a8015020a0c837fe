//! Fan-out of server events to the connections attached to a workspace.
//!
//! Every connection owns an unbounded outbound queue drained by its socket
//! writer task. Enqueueing never awaits, so events broadcast from one source
//! reach each connection in the order they were emitted.

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use tracing::{error, trace};
use uuid::Uuid;

use crate::ws::ServerMessage;

/// Sending half of one connection's outbound queue
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    /// Default target for terminal input/resize that omit `processId`
    pub subject_process_id: Option<String>,
    sender: mpsc::UnboundedSender<Utf8Bytes>,
}

impl ConnectionHandle {
    pub fn new(subject_process_id: Option<String>) -> (Self, mpsc::UnboundedReceiver<Utf8Bytes>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                subject_process_id,
                sender,
            },
            receiver,
        )
    }

    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Send a single event to this connection only
    pub fn send_to(&self, msg: &ServerMessage) -> bool {
        match encode(msg) {
            Some(frame) => self.send_frame(frame),
            None => false,
        }
    }

    pub(crate) fn send_frame(&self, frame: Utf8Bytes) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Serialize an event into a text frame
pub fn encode(msg: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            None
        }
    }
}

/// Deliver `msg` to every open connection. Returns how many accepted it.
pub fn fan_out<'a>(
    connections: impl IntoIterator<Item = &'a ConnectionHandle>,
    msg: &ServerMessage,
) -> usize {
    let mut connections = connections.into_iter().peekable();
    if connections.peek().is_none() {
        return 0;
    }

    let Some(frame) = encode(msg) else {
        return 0;
    };

    let mut delivered = 0;
    for conn in connections {
        if !conn.is_open() {
            trace!(conn_id = %conn.id, "Skipping closed connection");
            continue;
        }
        if conn.send_frame(frame.clone()) {
            delivered += 1;
        }
    }
    delivered
}
