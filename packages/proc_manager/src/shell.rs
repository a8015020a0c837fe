//! Shell normalization.
//!
//! Clients ask for whatever shell they are used to (`/bin/zsh -l`, `fish`). When the
//! requested shell is not installed on this host, a substitution table swaps it for
//! one that is and strips the flags the substitute would reject.

use std::path::Path;
use tracing::info;

/// One row of the substitution table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellSubstitution {
    /// Basename of the requested shell (`zsh`, `bash`, ...)
    pub shell: String,
    /// Command to run instead
    pub replacement: String,
    /// Arguments dropped from the request when the substitution applies
    pub strip_args: Vec<String>,
}

impl ShellSubstitution {
    pub fn new(shell: &str, replacement: &str, strip_args: &[&str]) -> Self {
        Self {
            shell: shell.to_string(),
            replacement: replacement.to_string(),
            strip_args: strip_args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of normalizing a requested command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub command: String,
    pub args: Vec<String>,
    /// Original command when a substitution was applied
    pub substituted_from: Option<String>,
}

/// Substitution policy for unavailable shells
#[derive(Clone, Debug)]
pub struct ShellPolicy {
    substitutions: Vec<ShellSubstitution>,
}

impl Default for ShellPolicy {
    fn default() -> Self {
        Self::new(default_substitutions())
    }
}

/// Built-in table: every login shell falls back to POSIX `sh`.
pub fn default_substitutions() -> Vec<ShellSubstitution> {
    vec![
        ShellSubstitution::new("zsh", "sh", &["-l", "--login", "--no-rcs", "--no-globalrcs"]),
        ShellSubstitution::new("fish", "sh", &["-l", "--login", "--no-config", "--private"]),
        ShellSubstitution::new(
            "bash",
            "sh",
            &["-l", "--login", "--norc", "--noprofile", "--posix"],
        ),
    ]
}

impl ShellPolicy {
    pub fn new(substitutions: Vec<ShellSubstitution>) -> Self {
        Self { substitutions }
    }

    pub fn substitutions(&self) -> &[ShellSubstitution] {
        &self.substitutions
    }

    /// Normalize against the commands installed on this host
    pub fn normalize(&self, command: &str, args: &[String]) -> NormalizedCommand {
        self.normalize_with(command, args, is_available)
    }

    /// Normalize with an explicit availability probe.
    ///
    /// Only the first matching row applies; the replacement itself is not re-normalized.
    pub fn normalize_with(
        &self,
        command: &str,
        args: &[String],
        available: impl Fn(&str) -> bool,
    ) -> NormalizedCommand {
        let unchanged = || NormalizedCommand {
            command: command.to_string(),
            args: args.to_vec(),
            substituted_from: None,
        };

        let Some(name) = Path::new(command).file_name().and_then(|n| n.to_str()) else {
            return unchanged();
        };

        let Some(row) = self.substitutions.iter().find(|s| s.shell == name) else {
            return unchanged();
        };

        if available(command) {
            return unchanged();
        }

        let args: Vec<String> = args
            .iter()
            .filter(|a| !row.strip_args.contains(*a))
            .cloned()
            .collect();

        info!(
            "Shell '{}' unavailable, substituting '{}' (args: {:?})",
            command, row.replacement, args
        );

        NormalizedCommand {
            command: row.replacement.clone(),
            args,
            substituted_from: Some(command.to_string()),
        }
    }
}

/// Whether a command resolves on this host
pub fn is_available(command: &str) -> bool {
    let path = Path::new(command);
    if path.is_absolute() {
        path.is_file()
    } else {
        which::which(command).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unmatched_command_untouched() {
        let policy = ShellPolicy::default();
        let out = policy.normalize_with("python3", &args(&["-l"]), |_| false);
        assert_eq!(out.command, "python3");
        assert_eq!(out.args, args(&["-l"]));
        assert!(out.substituted_from.is_none());
    }

    #[test]
    fn test_available_shell_untouched() {
        let policy = ShellPolicy::default();
        let out = policy.normalize_with("/bin/zsh", &args(&["-l"]), |_| true);
        assert_eq!(out.command, "/bin/zsh");
        assert_eq!(out.args, args(&["-l"]));
    }

    #[test]
    fn test_unavailable_shell_substituted_by_basename() {
        let policy = ShellPolicy::default();
        let out = policy.normalize_with("/usr/local/bin/zsh", &args(&["-l", "-c", "ls"]), |_| false);
        assert_eq!(out.command, "sh");
        assert_eq!(out.args, args(&["-c", "ls"]));
        assert_eq!(out.substituted_from.as_deref(), Some("/usr/local/bin/zsh"));
    }

    #[test]
    fn test_custom_table() {
        let policy = ShellPolicy::new(vec![ShellSubstitution::new("bash", "/bin/dash", &["--norc"])]);
        let out = policy.normalize_with("bash", &args(&["--norc", "--login"]), |_| false);
        assert_eq!(out.command, "/bin/dash");
        // only listed flags are stripped
        assert_eq!(out.args, args(&["--login"]));

        let out = policy.normalize_with("zsh", &args(&[]), |_| false);
        assert_eq!(out.command, "zsh");
    }

    #[test]
    fn test_deterministic() {
        let policy = ShellPolicy::default();
        let a = policy.normalize_with("fish", &args(&["--login"]), |_| false);
        let b = policy.normalize_with("fish", &args(&["--login"]), |_| false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_is_available() {
        assert!(is_available("sh"));
        assert!(!is_available("/nonexistent/bin/zsh"));
    }
}
