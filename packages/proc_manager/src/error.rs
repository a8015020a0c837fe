use std::fmt;

/// Errors that can occur during process operations
#[derive(Debug)]
pub enum ProcessError {
    /// Failed to launch the process
    SpawnFailed(String),
    /// Failed to write to the process's stdin
    WriteFailed(String),
    /// Failed to deliver a resize hint
    ResizeFailed(String),
    /// Failed to terminate the process
    KillFailed(String),
    /// Operation is not available for this process mode
    Unsupported(&'static str),
    /// Process has already exited
    ProcessExited,
    /// Channel communication error
    ChannelError(String),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::SpawnFailed(msg) => write!(f, "Failed to spawn process: {}", msg),
            ProcessError::WriteFailed(msg) => write!(f, "Failed to write to process: {}", msg),
            ProcessError::ResizeFailed(msg) => write!(f, "Failed to resize process: {}", msg),
            ProcessError::KillFailed(msg) => write!(f, "Failed to kill process: {}", msg),
            ProcessError::Unsupported(op) => write!(f, "Unsupported operation: {}", op),
            ProcessError::ProcessExited => write!(f, "Process has exited"),
            ProcessError::ChannelError(msg) => write!(f, "Channel error: {}", msg),
        }
    }
}

impl std::error::Error for ProcessError {}
