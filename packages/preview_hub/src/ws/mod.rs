//! Workspace WebSocket
//!
//! Every viewer of a workspace holds one connection that:
//! - Receives file, preview and process events for that workspace
//! - Sends terminal input/resize for the workspace's interactive processes

mod handler;
mod protocol;

pub use handler::handle_preview_ws;
pub use protocol::{ClientMessage, ServerMessage, StreamName, decode_client_message, now_millis};
