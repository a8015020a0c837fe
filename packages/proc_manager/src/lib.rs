//! Process Manager - child process lifecycle with streamed stdio
//!
//! Spawns one OS process per call, streams its stdout/stderr as ordered events and,
//! for interactive processes, accepts stdin and terminal resize hints. No
//! pseudo-terminal is allocated; geometry travels via `COLUMNS`/`LINES` and `SIGWINCH`.
//! It has no HTTP dependencies and knows nothing about workspaces.
//!
//! # Example
//!
//! ```no_run
//! use proc_manager::{ProcessActor, ProcessConfig, ProcessEvent, ProcessMode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ProcessConfig {
//!         command: "/bin/sh".to_string(),
//!         mode: ProcessMode::Interactive,
//!         ..Default::default()
//!     };
//!
//!     let (handle, mut events) = ProcessActor::spawn(config).unwrap();
//!     handle.write_str("echo hello; exit\n").await.unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ProcessEvent::Output { stream, data, .. } => {
//!                 println!("{}: {:?}", stream.as_str(), String::from_utf8_lossy(&data));
//!             }
//!             ProcessEvent::Exited { exit_code } => {
//!                 println!("exited with {}", exit_code);
//!             }
//!         }
//!     }
//! }
//! ```

mod error;
pub mod process;
pub mod shell;

pub use error::ProcessError;
pub use process::{
    OutputStream, ProcessActor, ProcessConfig, ProcessEvent, ProcessHandle, ProcessMode,
    ProcessState, UNKNOWN_EXIT_CODE,
};
pub use shell::{NormalizedCommand, ShellPolicy, ShellSubstitution};
