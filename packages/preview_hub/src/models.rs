use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{HubError, HubResult};

pub const MAX_WORKSPACE_ID_LEN: usize = 128;

/// Validated workspace identifier.
///
/// Used verbatim as a directory name under the workspace root, so only
/// `[A-Za-z0-9._-]` is accepted and `.`/`..` are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn parse(raw: &str) -> HubResult<Self> {
        if raw.is_empty() {
            return Err(HubError::InvalidArgument(
                "workspace id must not be empty".into(),
            ));
        }
        if raw.len() > MAX_WORKSPACE_ID_LEN {
            return Err(HubError::InvalidArgument(format!(
                "workspace id too long ({} chars, max {})",
                raw.len(),
                MAX_WORKSPACE_ID_LEN
            )));
        }
        if raw == "." || raw == ".." {
            return Err(HubError::InvalidArgument(format!(
                "invalid workspace id: {raw}"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(HubError::InvalidArgument(format!(
                "workspace id contains invalid characters: {raw}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution mode as exposed over the API
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecMode {
    #[default]
    OneShot,
    Interactive,
}

impl From<ExecMode> for proc_manager::ProcessMode {
    fn from(mode: ExecMode) -> Self {
        match mode {
            ExecMode::OneShot => proc_manager::ProcessMode::OneShot,
            ExecMode::Interactive => proc_manager::ProcessMode::Interactive,
        }
    }
}

/// Description of a running process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub process_id: String,
    pub command: String,
    pub args: Vec<String>,
    /// Working directory relative to the workspace root
    pub working_directory: String,
    pub mode: ExecMode,
    pub pid: Option<u32>,
    /// Set when the requested shell was swapped for an available one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_from: Option<String>,
    pub started_at: String,
}
