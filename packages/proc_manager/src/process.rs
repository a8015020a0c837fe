use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ProcessError;

/// How long to wait for stdout/stderr to drain after the child exits.
/// Background grandchildren can hold the pipes open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Exit code reported when the exit status could not be determined.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Execution mode of a spawned process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessMode {
    /// Stdin is closed; output is streamed and captured until exit
    OneShot,
    /// Stdin is writable and resize hints are accepted
    Interactive,
}

/// Configuration for spawning a process
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub mode: ProcessMode,
    pub cols: u16,
    pub rows: u16,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: "/bin/sh".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            mode: ProcessMode::OneShot,
            cols: 80,
            rows: 24,
        }
    }
}

/// Which pipe a chunk of output came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Events emitted by a running process, in the order they happened.
/// `Exited` is always last and is sent exactly once.
#[derive(Clone, Debug)]
pub enum ProcessEvent {
    Output {
        stream: OutputStream,
        data: Vec<u8>,
        timestamp: i64,
    },
    Exited {
        exit_code: i32,
    },
}

/// State of a process
#[derive(Clone, Debug)]
pub struct ProcessState {
    pub running: bool,
    pub pid: Option<u32>,
    pub command: String,
    pub args: Vec<String>,
    pub mode: ProcessMode,
    pub cols: u16,
    pub rows: u16,
}

/// Messages that can be sent to the process actor
pub(crate) enum ProcessMessage {
    WriteInput {
        data: Vec<u8>,
        respond_to: oneshot::Sender<Result<usize, ProcessError>>,
    },
    Resize {
        cols: u16,
        rows: u16,
        respond_to: oneshot::Sender<Result<(), ProcessError>>,
    },
    GetState {
        respond_to: oneshot::Sender<ProcessState>,
    },
    Kill {
        respond_to: oneshot::Sender<Result<(), ProcessError>>,
    },
}

/// Channel to a process actor, shared by both handle variants
#[derive(Clone)]
pub struct ActorChannel {
    sender: mpsc::Sender<ProcessMessage>,
    pid: Option<u32>,
}

impl ActorChannel {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ProcessMessage,
    ) -> Result<T, ProcessError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ProcessError::ProcessExited)?;
        rx.await
            .map_err(|_| ProcessError::ChannelError("Failed to receive actor response".into()))
    }
}

/// Handle to a spawned process, shaped by its mode.
///
/// Only `Interactive` processes accept input and resize hints; calling those on a
/// `OneShot` handle returns `ProcessError::Unsupported` without touching the actor.
#[derive(Clone)]
pub enum ProcessHandle {
    OneShot(ActorChannel),
    Interactive(ActorChannel),
}

impl ProcessHandle {
    fn channel(&self) -> &ActorChannel {
        match self {
            ProcessHandle::OneShot(ch) | ProcessHandle::Interactive(ch) => ch,
        }
    }

    pub fn mode(&self) -> ProcessMode {
        match self {
            ProcessHandle::OneShot(_) => ProcessMode::OneShot,
            ProcessHandle::Interactive(_) => ProcessMode::Interactive,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.channel().pid()
    }

    /// Write data to the process's stdin
    pub async fn write(&self, data: &[u8]) -> Result<usize, ProcessError> {
        match self {
            ProcessHandle::Interactive(ch) => {
                let data = data.to_vec();
                ch.request(|respond_to| ProcessMessage::WriteInput { data, respond_to })
                    .await?
            }
            ProcessHandle::OneShot(_) => Err(ProcessError::Unsupported("stdin on one-shot process")),
        }
    }

    /// Write a string to the process's stdin
    pub async fn write_str(&self, text: &str) -> Result<usize, ProcessError> {
        self.write(text.as_bytes()).await
    }

    /// Deliver a terminal geometry hint
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), ProcessError> {
        match self {
            ProcessHandle::Interactive(ch) => {
                ch.request(|respond_to| ProcessMessage::Resize {
                    cols,
                    rows,
                    respond_to,
                })
                .await?
            }
            ProcessHandle::OneShot(_) => Err(ProcessError::Unsupported("resize on one-shot process")),
        }
    }

    /// Get the current state of the process
    pub async fn state(&self) -> Result<ProcessState, ProcessError> {
        self.channel()
            .request(|respond_to| ProcessMessage::GetState { respond_to })
            .await
    }

    /// Terminate the process
    pub async fn kill(&self) -> Result<(), ProcessError> {
        self.channel()
            .request(|respond_to| ProcessMessage::Kill { respond_to })
            .await?
    }
}

/// The actor that owns a single child process.
///
/// Stdin is fed by a separate writer task so a child that stops reading its
/// input never blocks kill, resize or exit handling.
pub struct ProcessActor {
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
    stdin_writer: Option<JoinHandle<()>>,
    state: ProcessState,
}

impl ProcessActor {
    /// Spawn a process and return a handle plus its ordered event stream
    pub fn spawn(
        config: ProcessConfig,
    ) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<ProcessEvent>), ProcessError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        if let Some(dir) = &config.working_dir {
            debug!("Setting working directory: {}", dir.display());
            cmd.current_dir(dir);
        }

        // No PTY is allocated, so geometry is advertised through the environment
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("COLUMNS", config.cols.to_string());
        cmd.env("LINES", config.rows.to_string());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let stdin = match config.mode {
            ProcessMode::Interactive => Stdio::piped(),
            ProcessMode::OneShot => Stdio::null(),
        };
        cmd.stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            "Spawning process: {} with args: {:?} ({:?})",
            config.command, config.args, config.mode
        );

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn command '{}': {}", config.command, e);
            ProcessError::SpawnFailed(format!("{}: {}", config.command, e))
        })?;

        let pid = child.id();
        info!("Process started with PID: {:?}", pid);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::channel(32);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputStream::Stderr, event_tx.clone()));
        }

        let (stdin, stdin_writer) = match child.stdin.take() {
            Some(pipe) => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(spawn_stdin_writer(pipe, rx)))
            }
            None => (None, None),
        };

        let actor = Self {
            stdin,
            stdin_writer,
            state: ProcessState {
                running: true,
                pid,
                command: config.command.clone(),
                args: config.args.clone(),
                mode: config.mode,
                cols: config.cols,
                rows: config.rows,
            },
        };

        tokio::spawn(actor.run(child, msg_rx, readers, event_tx));

        let channel = ActorChannel {
            sender: msg_tx,
            pid,
        };
        let handle = match config.mode {
            ProcessMode::OneShot => ProcessHandle::OneShot(channel),
            ProcessMode::Interactive => ProcessHandle::Interactive(channel),
        };
        Ok((handle, event_rx))
    }

    async fn run(
        mut self,
        mut child: Child,
        mut receiver: mpsc::Receiver<ProcessMessage>,
        readers: Vec<JoinHandle<()>>,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) {
        debug!(
            "Process actor started for command: {} with PID: {:?}",
            self.state.command, self.state.pid
        );

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(msg) = receiver.recv() => match msg {
                    ProcessMessage::WriteInput { data, respond_to } => {
                        let result = self.handle_write_input(data);
                        let _ = respond_to.send(result);
                    }
                    ProcessMessage::Resize { cols, rows, respond_to } => {
                        let result = self.handle_resize(cols, rows);
                        let _ = respond_to.send(result);
                    }
                    ProcessMessage::GetState { respond_to } => {
                        let _ = respond_to.send(self.state.clone());
                    }
                    ProcessMessage::Kill { respond_to } => {
                        let result = self.handle_kill(&mut child);
                        let _ = respond_to.send(result);
                    }
                },
            }
        };

        // Close stdin and stop accepting requests before reporting the exit
        self.stdin = None;
        if let Some(writer) = self.stdin_writer.take() {
            writer.abort();
        }
        self.state.running = false;
        drop(receiver);

        for reader in readers {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader)
                .await
                .is_err()
            {
                warn!(
                    "Output of PID {:?} still open after exit, dropping remainder",
                    self.state.pid
                );
            }
        }

        let exit_code = match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                warn!("Failed to wait on PID {:?}: {}", self.state.pid, e);
                UNKNOWN_EXIT_CODE
            }
        };
        info!(
            "Process {} (PID {:?}) exited with code {}",
            self.state.command, self.state.pid, exit_code
        );
        let _ = events.send(ProcessEvent::Exited { exit_code });
    }

    /// Queue input for the stdin writer; returns once queued, not once written
    fn handle_write_input(&mut self, data: Vec<u8>) -> Result<usize, ProcessError> {
        let len = data.len();
        self.stdin
            .as_ref()
            .ok_or_else(|| ProcessError::WriteFailed("stdin is closed".into()))?
            .send(data)
            .map_err(|_| ProcessError::WriteFailed("stdin is closed".into()))?;
        Ok(len)
    }

    fn handle_resize(&mut self, cols: u16, rows: u16) -> Result<(), ProcessError> {
        self.state.cols = cols;
        self.state.rows = rows;

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.state.pid {
                kill(Pid::from_raw(pid as i32), Signal::SIGWINCH)
                    .map_err(|e| ProcessError::ResizeFailed(e.to_string()))?;
            }
        }

        Ok(())
    }

    fn handle_kill(&mut self, child: &mut Child) -> Result<(), ProcessError> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.state.pid {
                return kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
                    .map_err(|e| ProcessError::KillFailed(e.to_string()));
            }
        }

        child
            .start_kill()
            .map_err(|e| ProcessError::KillFailed(e.to_string()))
    }
}

fn spawn_stdin_writer(
    mut stdin: ChildStdin,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(data) = queue.recv().await {
            let written = match stdin.write_all(&data).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                debug!("stdin writer stopping: {}", e);
                break;
            }
        }
    })
}

fn spawn_reader<R>(
    mut reader: R,
    stream: OutputStream,
    events: mpsc::UnboundedSender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; 4096];
        loop {
            match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    let event = ProcessEvent::Output {
                        stream,
                        data: buffer[..n].to_vec(),
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Error reading {}: {}", stream.as_str(), e);
                    break;
                }
            }
        }
        debug!("{} reader exiting", stream.as_str());
    })
}

/// Map an exit status to a numeric code; signal deaths become `128 + signal`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    UNKNOWN_EXIT_CODE
}
