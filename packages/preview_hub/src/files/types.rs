use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{HubError, HubResult};

/// Workspace-relative path with traversal removed.
///
/// A leading `/` is stripped and `.` components are dropped; `..`, drive
/// prefixes and NUL bytes are rejected. The root of the workspace is the
/// empty path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelPath(String);

impl RelPath {
    pub fn parse(raw: &str) -> HubResult<Self> {
        if raw.contains('\0') {
            return Err(HubError::InvalidArgument(
                "path must not contain NUL bytes".into(),
            ));
        }

        let mut parts = Vec::new();
        for component in Path::new(raw.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(s) => parts.push(s),
                    None => {
                        return Err(HubError::InvalidArgument(format!(
                            "path is not valid UTF-8: {raw}"
                        )));
                    }
                },
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(HubError::InvalidArgument(format!(
                        "path escapes the workspace: {raw}"
                    )));
                }
            }
        }

        Ok(Self(parts.join("/")))
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this path inside `base`
    pub fn resolve(&self, base: &Path) -> PathBuf {
        if self.is_root() {
            base.to_path_buf()
        } else {
            base.join(&self.0)
        }
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            f.write_str(&self.0)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_path_normalizes() {
        assert_eq!(RelPath::parse("a/b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(RelPath::parse("/a/b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(RelPath::parse("./a//b.txt").unwrap().as_str(), "a/b.txt");
        assert!(RelPath::parse("").unwrap().is_root());
        assert!(RelPath::parse(".").unwrap().is_root());
        assert!(RelPath::parse("/").unwrap().is_root());
    }

    #[test]
    fn test_rel_path_rejects_traversal() {
        for bad in ["..", "../x", "a/../../x", "a/..", "a\0b"] {
            assert!(
                matches!(RelPath::parse(bad), Err(HubError::InvalidArgument(_))),
                "expected rejection of {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_resolve_stays_under_base() {
        let base = Path::new("/srv/ws/demo");
        assert_eq!(
            RelPath::parse("/etc/passwd").unwrap().resolve(base),
            base.join("etc/passwd")
        );
        assert_eq!(RelPath::root().resolve(base), base);
    }

    #[test]
    fn test_dir_entry_serde() {
        let entry = DirEntry {
            name: "src".into(),
            kind: EntryKind::Directory,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "directory");
    }
}
