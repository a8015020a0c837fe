//! Workspace file primitives.
//!
//! The filesystem is authoritative; the session's file cache is a read-through
//! overlay that is only updated after a successful write.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{DirEntry, EntryKind, RelPath};
use crate::error::{HubError, HubResult};
use crate::session::Session;
use crate::ws::ServerMessage;

async fn announce_change(session: &Session, path: &RelPath) {
    session
        .broadcast(&ServerMessage::FileChange {
            preview_id: session.id.to_string(),
            path: path.as_str().to_string(),
        })
        .await;
}

/// Write to a sibling temp file and rename it over `target`, so a failed
/// write never leaves `target` half rewritten
async fn replace_file(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4()));

    let result = async {
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, target).await
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up {}: {}", staging.display(), e);
            }
        }
    }
    result
}

/// Write `content` to `path`, creating parent directories
pub async fn write(session: &Session, path: &RelPath, content: String) -> HubResult<()> {
    if path.is_root() {
        return Err(HubError::InvalidArgument("path is required".into()));
    }

    let target = path.resolve(&session.directory);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| HubError::storage(format!("creating parent of {path}"), e))?;
    }
    replace_file(&target, content.as_bytes())
        .await
        .map_err(|e| HubError::storage(format!("writing {path}"), e))?;

    debug!(preview_id = %session.id, path = %path, bytes = content.len(), "File written");
    session.cache_file(path.as_str(), content).await;
    announce_change(session, path).await;
    Ok(())
}

/// Read `path`, serving from the cache when possible
pub async fn read(session: &Session, path: &RelPath) -> HubResult<String> {
    if path.is_root() {
        return Err(HubError::InvalidArgument("path is required".into()));
    }
    if let Some(content) = session.cached_file(path.as_str()).await {
        return Ok(content);
    }

    let target = path.resolve(&session.directory);
    let meta = tokio::fs::metadata(&target)
        .await
        .map_err(|e| HubError::from_io(&format!("file {path}"), format!("reading {path}"), e))?;
    if meta.is_dir() {
        return Err(HubError::InvalidArgument(format!("{path} is a directory")));
    }

    let bytes = tokio::fs::read(&target)
        .await
        .map_err(|e| HubError::from_io(&format!("file {path}"), format!("reading {path}"), e))?;
    let content = String::from_utf8(bytes)
        .map_err(|_| HubError::InvalidArgument(format!("{path} is not valid UTF-8 text")))?;

    session.cache_file(path.as_str(), content.clone()).await;
    Ok(content)
}

/// Delete a file or directory. Non-empty directories need `recursive`.
pub async fn remove(session: &Session, path: &RelPath, recursive: bool) -> HubResult<()> {
    if path.is_root() {
        return Err(HubError::InvalidArgument(
            "cannot remove the workspace root".into(),
        ));
    }

    let target = path.resolve(&session.directory);
    let meta = tokio::fs::symlink_metadata(&target)
        .await
        .map_err(|e| HubError::from_io(&format!("file {path}"), format!("removing {path}"), e))?;

    if meta.is_dir() {
        if recursive {
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| HubError::storage(format!("removing {path}"), e))?;
        } else {
            let mut entries = tokio::fs::read_dir(&target)
                .await
                .map_err(|e| HubError::storage(format!("reading {path}"), e))?;
            let occupied = entries
                .next_entry()
                .await
                .map_err(|e| HubError::storage(format!("reading {path}"), e))?
                .is_some();
            if occupied {
                return Err(HubError::InvalidArgument(format!(
                    "directory {path} is not empty; pass recursive=true"
                )));
            }
            tokio::fs::remove_dir(&target)
                .await
                .map_err(|e| HubError::storage(format!("removing {path}"), e))?;
        }
        session.evict_prefix(path.as_str()).await;
    } else {
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| HubError::from_io(&format!("file {path}"), format!("removing {path}"), e))?;
        session.evict_file(path.as_str()).await;
    }

    debug!(preview_id = %session.id, path = %path, recursive, "Removed");
    announce_change(session, path).await;
    Ok(())
}

/// List a directory straight from disk: directories first, then by name
pub async fn list_directory(session: &Session, path: &RelPath) -> HubResult<Vec<DirEntry>> {
    let target = path.resolve(&session.directory);
    let mut read_dir = tokio::fs::read_dir(&target).await.map_err(|e| {
        HubError::from_io(&format!("directory {path}"), format!("listing {path}"), e)
    })?;

    let mut entries = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(HubError::storage(format!("listing {path}"), e)),
        };

        let kind = match entry.file_type().await {
            Ok(ft) if ft.is_symlink() => EntryKind::Symlink,
            Ok(ft) if ft.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::File,
            Err(e) => {
                warn!("Skipping unreadable entry {:?}: {}", entry.path(), e);
                continue;
            }
        };

        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
        });
    }

    entries.sort_by(|a, b| {
        let a_dir = a.kind == EntryKind::Directory;
        let b_dir = b.kind == EntryKind::Directory;
        b_dir.cmp(&a_dir).then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

/// Create a directory. Without `recursive` the parent must exist.
pub async fn mkdir(session: &Session, path: &RelPath, recursive: bool) -> HubResult<()> {
    if path.is_root() {
        return Err(HubError::InvalidArgument("path is required".into()));
    }

    let target = path.resolve(&session.directory);
    let result = if recursive {
        tokio::fs::create_dir_all(&target).await
    } else {
        tokio::fs::create_dir(&target).await
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
            HubError::InvalidArgument(format!("{path} already exists")),
        ),
        Err(e) => Err(HubError::from_io(
            &format!("parent of {path}"),
            format!("creating {path}"),
            e,
        )),
    }
}

/// Drop the cache entry for `path`. Returns whether one existed.
pub async fn evict(session: &Session, path: &RelPath) -> bool {
    session.evict_file(path.as_str()).await
}

/// Resolve a working directory for a process, creating it if absent
pub async fn prepare_dir(session: &Session, path: &RelPath) -> HubResult<PathBuf> {
    let target = path.resolve(&session.directory);
    tokio::fs::create_dir_all(&target)
        .await
        .map_err(|e| HubError::storage(format!("creating directory {path}"), e))?;
    Ok(target)
}
