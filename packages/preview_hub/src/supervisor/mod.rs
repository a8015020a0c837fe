//! Process Supervisor
//!
//! Spawns child processes inside a workspace, keeps their handles in the
//! owning [`Session`] and relays their output to every viewer of that
//! workspace. Each process gets one forwarding task that drains its event
//! stream in order, so output chunks always precede `process-completed`.

mod output;

use std::collections::HashMap;
use std::sync::Arc;

use proc_manager::{
    OutputStream, ProcessActor, ProcessConfig, ProcessError, ProcessEvent, ShellPolicy,
    UNKNOWN_EXIT_CODE,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::error::{HubError, HubResult};
use crate::files::{self, RelPath};
use crate::models::{ExecMode, ProcessInfo};
use crate::registry::SessionRegistry;
use crate::session::{ManagedProcess, Session};
use crate::ws::ServerMessage;

use output::{TailCapture, Utf8StreamDecoder};

/// Body of `POST /api/previews/{id}/execute`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory relative to the workspace root
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_cols() -> u16 {
    80
}
fn default_rows() -> u16 {
    24
}

impl SpawnRequest {
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            interactive: false,
            cols: default_cols(),
            rows: default_rows(),
            env: HashMap::new(),
        }
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn mode(&self) -> ExecMode {
        if self.interactive {
            ExecMode::Interactive
        } else {
            ExecMode::OneShot
        }
    }
}

pub struct ProcessSupervisor {
    registry: Arc<SessionRegistry>,
    shells: ShellPolicy,
    max_capture_bytes: usize,
}

impl ProcessSupervisor {
    pub fn new(registry: Arc<SessionRegistry>, config: SupervisorConfig) -> Self {
        Self {
            registry,
            shells: config.shell_policy,
            max_capture_bytes: config.max_capture_bytes,
        }
    }

    /// Launch a process in the workspace of `session` and start relaying its output.
    ///
    /// The process is registered in whichever session is live for that
    /// workspace when it starts, recreating it if the idle sweep already
    /// removed `session`. The handle is registered before the forwarding task
    /// starts, so the process is visible in `list` before any of its output is
    /// broadcast.
    pub async fn spawn(
        &self,
        session: &Arc<Session>,
        request: SpawnRequest,
    ) -> HubResult<ProcessInfo> {
        if request.command.trim().is_empty() {
            return Err(HubError::InvalidArgument("command is required".into()));
        }

        let cwd = match request.cwd.as_deref() {
            Some(raw) => RelPath::parse(raw)?,
            None => RelPath::root(),
        };
        let working_dir = files::prepare_dir(session, &cwd).await?;

        let process_id = Uuid::new_v4().to_string();
        let mode = request.mode();
        let normalized = self.shells.normalize(&request.command, &request.args);

        let mut env: Vec<(String, String)> = request.env.into_iter().collect();
        env.sort();

        let config = ProcessConfig {
            command: normalized.command.clone(),
            args: normalized.args.clone(),
            working_dir: Some(working_dir),
            env,
            mode: mode.into(),
            cols: request.cols,
            rows: request.rows,
        };

        // the lease keeps the sweep away until the process is registered
        let lease = self.registry.claim(&session.id).await?;
        let session = lease.session.clone();

        let (handle, events) = match ProcessActor::spawn(config) {
            Ok(spawned) => spawned,
            Err(e) => {
                drop(lease);
                let reason = e.to_string();
                error!(
                    preview_id = %session.id,
                    process_id = %process_id,
                    "Failed to spawn '{}': {}", normalized.command, reason
                );
                session
                    .broadcast(&ServerMessage::ProcessCompleted {
                        preview_id: session.id.to_string(),
                        process_id: process_id.clone(),
                        exit_code: UNKNOWN_EXIT_CODE,
                        stdout: String::new(),
                        stderr: reason.clone(),
                    })
                    .await;
                rearm_if_idle(&self.registry, &session).await;
                return Err(HubError::Spawn { process_id, reason });
            }
        };

        let info = ProcessInfo {
            process_id: process_id.clone(),
            command: normalized.command,
            args: normalized.args,
            working_directory: cwd.as_str().to_string(),
            mode,
            pid: handle.pid(),
            substituted_from: normalized.substituted_from,
            started_at: chrono::Utc::now().to_rfc3339(),
        };

        session
            .insert_process(ManagedProcess {
                handle,
                info: info.clone(),
            })
            .await;
        drop(lease);

        info!(
            preview_id = %session.id,
            process_id = %process_id,
            pid = ?info.pid,
            "Started {:?} process: {} {:?}", mode, info.command, info.args
        );

        tokio::spawn(forward_events(
            self.registry.clone(),
            session,
            process_id,
            mode,
            events,
            self.max_capture_bytes,
        ));

        Ok(info)
    }

    /// Send text to an interactive process's stdin. Unknown ids are ignored.
    pub async fn write_input(&self, session: &Session, process_id: &str, input: &str) {
        let Some(handle) = session.process_handle(process_id).await else {
            debug!(preview_id = %session.id, process_id, "Input for unknown process ignored");
            return;
        };
        if let Err(e) = handle.write_str(input).await {
            log_ignored(session, process_id, "input", &e);
        }
    }

    /// Forward a geometry hint. Unknown ids and one-shot processes are ignored.
    pub async fn resize(&self, session: &Session, process_id: &str, cols: u16, rows: u16) {
        let Some(handle) = session.process_handle(process_id).await else {
            debug!(preview_id = %session.id, process_id, "Resize for unknown process ignored");
            return;
        };
        if let Err(e) = handle.resize(cols, rows).await {
            log_ignored(session, process_id, "resize", &e);
        }
    }

    /// Terminate a running process. Completion is reported by its forwarding task.
    pub async fn kill(&self, session: &Session, process_id: &str) -> HubResult<()> {
        let handle = session
            .process_handle(process_id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("process {process_id}")))?;

        match handle.kill().await {
            Ok(()) | Err(ProcessError::ProcessExited) => {
                info!(preview_id = %session.id, process_id, "Kill requested");
            }
            Err(e) => {
                warn!(preview_id = %session.id, process_id, "Kill failed: {}", e);
            }
        }
        Ok(())
    }

    pub async fn list(&self, session: &Session) -> Vec<ProcessInfo> {
        session.process_infos().await
    }

    /// Terminate every process in every session
    pub async fn shutdown_all(&self) {
        for session in self.registry.sessions().await {
            for (process_id, handle) in session.process_handles().await {
                if let Err(e) = handle.kill().await {
                    debug!(process_id = %process_id, "Kill during shutdown: {}", e);
                }
            }
        }
    }
}

fn log_ignored(session: &Session, process_id: &str, what: &str, err: &ProcessError) {
    match err {
        ProcessError::Unsupported(_) => {
            warn!(preview_id = %session.id, process_id, "Ignoring {}: {}", what, err)
        }
        _ => debug!(preview_id = %session.id, process_id, "Ignoring {}: {}", what, err),
    }
}

async fn rearm_if_idle(registry: &Arc<SessionRegistry>, session: &Arc<Session>) {
    if session.connection_count().await == 0 && session.process_count().await == 0 {
        registry.schedule_idle_sweep(session).await;
    }
}

/// Drain one process's events into the session, then report completion
async fn forward_events(
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
    process_id: String,
    mode: ExecMode,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    max_capture_bytes: usize,
) {
    let preview_id = session.id.to_string();
    let capture = mode == ExecMode::OneShot;

    let mut stdout_decoder = Utf8StreamDecoder::new();
    let mut stderr_decoder = Utf8StreamDecoder::new();
    let mut stdout_capture = TailCapture::new(max_capture_bytes);
    let mut stderr_capture = TailCapture::new(max_capture_bytes);

    let emit = |stream: OutputStream, output: String| ServerMessage::ProcessOutput {
        preview_id: preview_id.clone(),
        process_id: process_id.clone(),
        output,
        stream: stream.into(),
    };

    let mut exit_code = UNKNOWN_EXIT_CODE;
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Output { stream, data, .. } => {
                let (decoder, captured) = match stream {
                    OutputStream::Stdout => (&mut stdout_decoder, &mut stdout_capture),
                    OutputStream::Stderr => (&mut stderr_decoder, &mut stderr_capture),
                };
                let text = decoder.decode(&data);
                if text.is_empty() {
                    continue;
                }
                if capture {
                    captured.push(&text);
                }
                session.broadcast(&emit(stream, text)).await;
            }
            ProcessEvent::Exited { exit_code: code } => {
                exit_code = code;
                break;
            }
        }
    }

    for (stream, decoder, captured) in [
        (OutputStream::Stdout, &mut stdout_decoder, &mut stdout_capture),
        (OutputStream::Stderr, &mut stderr_decoder, &mut stderr_capture),
    ] {
        let rest = decoder.finish();
        if !rest.is_empty() {
            if capture {
                captured.push(&rest);
            }
            session.broadcast(&emit(stream, rest)).await;
        }
    }

    session.take_process(&process_id).await;

    let (stdout, stderr) = if capture {
        (stdout_capture.into_string(), stderr_capture.into_string())
    } else {
        (String::new(), String::new())
    };

    let delivered = session
        .broadcast(&ServerMessage::ProcessCompleted {
            preview_id: preview_id.clone(),
            process_id: process_id.clone(),
            exit_code,
            stdout,
            stderr,
        })
        .await;

    info!(
        preview_id = %preview_id,
        process_id = %process_id,
        exit_code,
        viewers = delivered,
        "Process completed"
    );

    rearm_if_idle(&registry, &session).await;
}
