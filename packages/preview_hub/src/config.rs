use anyhow::{Context, Result};
use proc_manager::{ShellPolicy, ShellSubstitution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   config.toml:     [workspace]
//                    idle_grace_secs = 60
//
//   env var:         PREVIEW_HUB_WORKSPACE__IDLE_GRACE_SECS=60   (double underscore = nesting)
//
// The shell substitution table is only practical to set from config.toml:
//
//   [[process.shell_substitutions]]
//   shell = "zsh"
//   replacement = "/bin/bash"
//   strip_args = ["--no-rcs"]

pub const ENV_PREFIX: &str = "PREVIEW_HUB_";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub workspace: WorkspaceFileConfig,
    #[serde(default)]
    pub process: ProcessFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix for preview URLs announced in `preview-ready` events.
    /// Empty means server-relative URLs (`/preview/{id}/`).
    #[serde(default)]
    pub public_base_url: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: String::new(),
        }
    }
}

/// Workspace storage and lifetime (lives under `[workspace]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceFileConfig {
    /// Directory holding one subdirectory per workspace. Defaults to `<data_dir>/workspaces`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default = "default_idle_grace_secs")]
    pub idle_grace_secs: u64,
}

impl Default for WorkspaceFileConfig {
    fn default() -> Self {
        Self {
            root: None,
            idle_grace_secs: default_idle_grace_secs(),
        }
    }
}

/// Process supervision knobs (lives under `[process]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessFileConfig {
    /// Per-stream capture limit for one-shot completion events
    #[serde(default = "default_max_capture_kb")]
    pub max_capture_kb: usize,
    #[serde(default = "default_shell_substitutions")]
    pub shell_substitutions: Vec<ShellSubstitutionEntry>,
}

impl Default for ProcessFileConfig {
    fn default() -> Self {
        Self {
            max_capture_kb: default_max_capture_kb(),
            shell_substitutions: default_shell_substitutions(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellSubstitutionEntry {
    pub shell: String,
    pub replacement: String,
    #[serde(default)]
    pub strip_args: Vec<String>,
}

impl From<ShellSubstitution> for ShellSubstitutionEntry {
    fn from(s: ShellSubstitution) -> Self {
        Self {
            shell: s.shell,
            replacement: s.replacement,
            strip_args: s.strip_args,
        }
    }
}

impl From<&ShellSubstitutionEntry> for ShellSubstitution {
    fn from(e: &ShellSubstitutionEntry) -> Self {
        Self {
            shell: e.shell.clone(),
            replacement: e.replacement.clone(),
            strip_args: e.strip_args.clone(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_idle_grace_secs() -> u64 {
    300
}
fn default_max_capture_kb() -> usize {
    1024
}
fn default_shell_substitutions() -> Vec<ShellSubstitutionEntry> {
    proc_manager::shell::default_substitutions()
        .into_iter()
        .map(ShellSubstitutionEntry::from)
        .collect()
}

/// Build a figment that layers: defaults → config.toml → PREVIEW_HUB_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `PREVIEW_HUB_SERVER__PORT=9000`  →  `server.port = 9000`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
            public_base_url: fc.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Canonical URL of a workspace's preview
    pub fn preview_url(&self, preview_id: &str) -> String {
        format!("{}/preview/{}/", self.public_base_url, preview_id)
    }
}

#[derive(Clone, Debug)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    /// How long a session may sit with zero connections before it is dropped
    pub idle_grace: Duration,
}

impl WorkspaceConfig {
    pub fn from_file(fc: &WorkspaceFileConfig, dirs: &HubDirs) -> Self {
        Self {
            root: fc
                .root
                .clone()
                .unwrap_or_else(|| dirs.default_workspace_root()),
            idle_grace: Duration::from_secs(fc.idle_grace_secs),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub max_capture_bytes: usize,
    pub shell_policy: ShellPolicy,
}

impl SupervisorConfig {
    pub fn from_file(fc: &ProcessFileConfig) -> Self {
        Self {
            max_capture_bytes: fc.max_capture_kb * 1024,
            shell_policy: ShellPolicy::new(
                fc.shell_substitutions
                    .iter()
                    .map(ShellSubstitution::from)
                    .collect(),
            ),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_file(&ProcessFileConfig::default())
    }
}

/// Fully resolved configuration
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub supervisor: SupervisorConfig,
}

impl HubConfig {
    pub fn from_file(fc: &FileConfig, dirs: &HubDirs) -> Self {
        Self {
            server: ServerConfig::from_file(&fc.server),
            workspace: WorkspaceConfig::from_file(&fc.workspace, dirs),
            supervisor: SupervisorConfig::from_file(&fc.process),
        }
    }
}

// =============================================================================
// Directory layout, derived from --data-dir rather than figment
// =============================================================================

#[derive(Clone, Debug)]
pub struct HubDirs {
    pub data_dir: PathBuf,
}

impl HubDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".preview_hub"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn default_workspace_root(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 8080);
        assert!(fc.server.public_base_url.is_empty());
        assert!(fc.workspace.root.is_none());
        assert_eq!(fc.workspace.idle_grace_secs, 300);
        assert_eq!(fc.process.max_capture_kb, 1024);
        assert!(
            fc.process
                .shell_substitutions
                .iter()
                .any(|s| s.shell == "zsh" && s.replacement == "sh")
        );
    }

    // ── runtime views ───────────────────────────────────────────────────

    #[test]
    fn test_preview_url() {
        let sc = ServerConfig::from_file(&ServerFileConfig::default());
        assert_eq!(sc.preview_url("demo"), "/preview/demo/");

        let sc = ServerConfig::from_file(&ServerFileConfig {
            public_base_url: "https://hub.example.com/".into(),
            ..Default::default()
        });
        assert_eq!(sc.preview_url("demo"), "https://hub.example.com/preview/demo/");
    }

    #[test]
    fn test_workspace_root_defaults_under_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = HubDirs::new(Some(tmp.path().to_path_buf())).unwrap();
        let wc = WorkspaceConfig::from_file(&WorkspaceFileConfig::default(), &dirs);
        assert_eq!(wc.root, tmp.path().join("workspaces"));
        assert_eq!(wc.idle_grace, Duration::from_secs(300));
    }

    #[test]
    fn test_supervisor_config_from_file() {
        let fc = ProcessFileConfig {
            max_capture_kb: 4,
            shell_substitutions: vec![ShellSubstitutionEntry {
                shell: "zsh".into(),
                replacement: "/bin/bash".into(),
                strip_args: vec![],
            }],
        };
        let sc = SupervisorConfig::from_file(&fc);
        assert_eq!(sc.max_capture_bytes, 4096);
        assert_eq!(sc.shell_policy.substitutions().len(), 1);
        assert_eq!(sc.shell_policy.substitutions()[0].replacement, "/bin/bash");
    }

    // ── HubDirs ─────────────────────────────────────────────────────────

    #[test]
    fn test_hub_dirs_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = HubDirs::new(Some(tmp.path().to_path_buf())).unwrap();

        assert_eq!(dirs.data_dir, tmp.path());
        assert!(tmp.path().is_dir());
        assert_eq!(dirs.config_toml_path(), tmp.path().join("config.toml"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.port, 8080);
        assert_eq!(fc.workspace.idle_grace_secs, 300);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nport = 9000\npublic_base_url = \"http://localhost:9000\"\n\
             [workspace]\nroot = \"/srv/previews\"\nidle_grace_secs = 30\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.port, 9000);
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.public_base_url, "http://localhost:9000");
        assert_eq!(fc.workspace.root, Some(PathBuf::from("/srv/previews")));
        assert_eq!(fc.workspace.idle_grace_secs, 30);
    }

    #[test]
    fn test_load_config_shell_table_replaces_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[[process.shell_substitutions]]\nshell = \"zsh\"\nreplacement = \"bash\"\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(
            fc.process.shell_substitutions,
            vec![ShellSubstitutionEntry {
                shell: "zsh".into(),
                replacement: "bash".into(),
                strip_args: vec![],
            }]
        );
    }
}
