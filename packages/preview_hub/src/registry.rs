//! Session Registry
//!
//! Maps workspace ids to live [`Session`]s. Sessions are created lazily on
//! first reference and dropped after sitting idle (no connections and no
//! running processes) for the configured grace period. Workspace directories
//! on disk outlive their sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broadcast::ConnectionHandle;
use crate::error::{HubError, HubResult};
use crate::models::WorkspaceId;
use crate::session::Session;
use crate::ws::ServerMessage;

/// Aggregate counts reported by `/health`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub sessions: usize,
    pub connections: usize,
    pub processes: usize,
}

/// A live session pinned in the registry.
///
/// While the lease is held the idle sweep cannot remove the session, since
/// removal needs the map write lock. Drop it before calling back into the
/// registry.
pub struct SessionLease<'a> {
    _map: RwLockReadGuard<'a, HashMap<WorkspaceId, Arc<Session>>>,
    pub session: Arc<Session>,
}

pub struct SessionRegistry {
    root: PathBuf,
    idle_grace: Duration,
    sessions: RwLock<HashMap<WorkspaceId, Arc<Session>>>,
    /// Number of sessions ever constructed
    created: AtomicU64,
    /// Parent of every idle sweep token
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new(root: PathBuf, idle_grace: Duration) -> Self {
        Self {
            root,
            idle_grace,
            sessions: RwLock::new(HashMap::new()),
            created: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Return the session for `id`, creating it and its directory if needed.
    ///
    /// The map write lock is held across directory creation so that racing
    /// callers for an unseen id produce exactly one session. A new session
    /// starts with its idle sweep armed; attaching or spawning cancels it.
    pub async fn get_or_create(self: &Arc<Self>, id: &WorkspaceId) -> HubResult<Arc<Session>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return Ok(session.clone());
        }

        let directory = self.root.join(id.as_str());
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| HubError::storage(format!("creating workspace directory for {id}"), e))?;

        let session = Arc::new(Session::new(id.clone(), directory));
        sessions.insert(id.clone(), session.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        self.schedule_idle_sweep(&session).await;

        info!(preview_id = %id, dir = %session.directory.display(), "Created session");
        Ok(session)
    }

    /// Non-creating lookup
    pub async fn get(&self, id: &WorkspaceId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Like [`get`](Self::get), but an unknown workspace is an error
    pub async fn require(&self, id: &WorkspaceId) -> HubResult<Arc<Session>> {
        self.get(id)
            .await
            .ok_or_else(|| HubError::NotFound(format!("workspace {id}")))
    }

    /// Pin the live session for `id`, creating it if needed, and cancel its
    /// pending idle sweep.
    ///
    /// The sweep is cancelled under the map read lock, so a concurrent sweep
    /// (which needs the write lock) either has not removed the entry yet or
    /// already has, in which case the session is recreated.
    pub async fn claim(self: &Arc<Self>, id: &WorkspaceId) -> HubResult<SessionLease<'_>> {
        loop {
            let map = self.sessions.read().await;
            if let Some(session) = map.get(id).cloned() {
                session.replace_sweep(None).await;
                return Ok(SessionLease { _map: map, session });
            }
            drop(map);
            self.get_or_create(id).await?;
        }
    }

    /// Attach a connection, creating the session if needed, and queue its ack
    pub async fn attach(
        self: &Arc<Self>,
        id: &WorkspaceId,
        conn: ConnectionHandle,
    ) -> HubResult<(Arc<Session>, usize)> {
        let lease = self.claim(id).await?;
        let count = lease.session.attach_and_ack(conn).await;
        debug!(preview_id = %id, count, "Connection attached");
        Ok((lease.session.clone(), count))
    }

    /// Detach a connection; arms the idle sweep when the session empties
    pub async fn detach(self: &Arc<Self>, session: &Arc<Session>, conn_id: &Uuid) -> usize {
        let remaining = session.detach(conn_id).await;
        debug!(preview_id = %session.id, remaining, "Connection detached");
        if remaining == 0 {
            self.schedule_idle_sweep(session).await;
        }
        remaining
    }

    /// Arm (or re-arm) the one-shot idle timer for `session`
    pub async fn schedule_idle_sweep(self: &Arc<Self>, session: &Arc<Session>) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let token = self.shutdown.child_token();
        session.replace_sweep(Some(token.clone())).await;

        let registry = Arc::downgrade(self);
        let weak_session = Arc::downgrade(session);
        let grace = self.idle_grace;
        let preview_id = session.id.clone();

        debug!(preview_id = %preview_id, grace_secs = grace.as_secs_f64(), "Idle sweep armed");

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(preview_id = %preview_id, "Idle sweep cancelled");
                }
                _ = tokio::time::sleep(grace) => {
                    if let (Some(registry), Some(session)) = (registry.upgrade(), weak_session.upgrade()) {
                        registry.remove_if_idle(&session, &token).await;
                    }
                }
            }
        });
    }

    /// Drop `session` if it is still registered, still idle and `token` is still live
    async fn remove_if_idle(&self, session: &Arc<Session>, token: &CancellationToken) -> bool {
        let mut sessions = self.sessions.write().await;

        if token.is_cancelled() {
            return false;
        }
        match sessions.get(&session.id) {
            Some(current) if Arc::ptr_eq(current, session) => {}
            _ => return false,
        }

        let connections = session.connection_count().await;
        let processes = session.process_count().await;
        if connections > 0 || processes > 0 {
            debug!(
                preview_id = %session.id,
                connections,
                processes,
                "Idle sweep skipped, session still in use"
            );
            return false;
        }

        sessions.remove(&session.id);
        info!(preview_id = %session.id, "Session removed after idle grace period");
        true
    }

    /// Broadcast to a workspace by id; unknown ids are a no-op
    pub async fn broadcast(&self, id: &WorkspaceId, msg: &ServerMessage) -> usize {
        match self.get(id).await {
            Some(session) => session.broadcast(msg).await,
            None => 0,
        }
    }

    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for session in self.sessions().await {
            stats.sessions += 1;
            stats.connections += session.connection_count().await;
            stats.processes += session.process_count().await;
        }
        stats
    }

    /// Cancel every pending idle sweep; no new ones are armed afterwards
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for session in self.sessions().await {
            session.replace_sweep(None).await;
        }
        info!("Session registry shut down");
    }
}
