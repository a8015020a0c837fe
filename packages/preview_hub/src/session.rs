use std::collections::HashMap;
use std::path::PathBuf;

use proc_manager::ProcessHandle;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::broadcast::{ConnectionHandle, fan_out};
use crate::models::{ProcessInfo, WorkspaceId};
use crate::ws::ServerMessage;

/// A running process owned by a session
pub struct ManagedProcess {
    pub handle: ProcessHandle,
    pub info: ProcessInfo,
}

/// Live state for one workspace.
///
/// Every container is locked independently and only for the duration of a
/// single mutation; no lock here is held across an `.await` on I/O.
pub struct Session {
    pub id: WorkspaceId,
    pub directory: PathBuf,
    connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
    file_cache: RwLock<HashMap<String, String>>,
    processes: RwLock<HashMap<String, ManagedProcess>>,
    idle_sweep: Mutex<Option<CancellationToken>>,
}

impl Session {
    pub fn new(id: WorkspaceId, directory: PathBuf) -> Self {
        Self {
            id,
            directory,
            connections: RwLock::new(HashMap::new()),
            file_cache: RwLock::new(HashMap::new()),
            processes: RwLock::new(HashMap::new()),
            idle_sweep: Mutex::new(None),
        }
    }

    // ── connections ─────────────────────────────────────────────────────

    /// Add a connection without an ack, returning the new connection count
    #[cfg(test)]
    pub(crate) async fn attach(&self, conn: ConnectionHandle) -> usize {
        let mut connections = self.connections.write().await;
        connections.insert(conn.id, conn);
        connections.len()
    }

    /// Add a connection and queue its `connection-established` ack.
    ///
    /// The ack is enqueued while the connection set is still write-locked, so
    /// no broadcast can reach the new connection ahead of it.
    pub async fn attach_and_ack(&self, conn: ConnectionHandle) -> usize {
        let mut connections = self.connections.write().await;
        let conn_id = conn.id;
        connections.insert(conn_id, conn);
        let count = connections.len();
        if let Some(conn) = connections.get(&conn_id) {
            conn.send_to(&ServerMessage::ConnectionEstablished {
                preview_id: self.id.to_string(),
                timestamp: crate::ws::now_millis(),
                client_count: count,
            });
        }
        count
    }

    /// Remove a connection, returning the remaining count
    pub async fn detach(&self, conn_id: &Uuid) -> usize {
        let mut connections = self.connections.write().await;
        connections.remove(conn_id);
        connections.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Fan an event out to every attached connection
    pub async fn broadcast(&self, msg: &ServerMessage) -> usize {
        let connections = self.connections.read().await;
        fan_out(connections.values(), msg)
    }

    // ── file cache ──────────────────────────────────────────────────────

    pub async fn cached_file(&self, path: &str) -> Option<String> {
        self.file_cache.read().await.get(path).cloned()
    }

    pub async fn cache_file(&self, path: &str, content: String) {
        self.file_cache
            .write()
            .await
            .insert(path.to_string(), content);
    }

    pub async fn evict_file(&self, path: &str) -> bool {
        self.file_cache.write().await.remove(path).is_some()
    }

    /// Drop `prefix` and every cached entry beneath it
    pub async fn evict_prefix(&self, prefix: &str) -> usize {
        let mut cache = self.file_cache.write().await;
        let before = cache.len();
        if prefix.is_empty() {
            cache.clear();
        } else {
            let nested = format!("{prefix}/");
            cache.retain(|k, _| k != prefix && !k.starts_with(&nested));
        }
        before - cache.len()
    }

    // ── processes ───────────────────────────────────────────────────────

    pub async fn insert_process(&self, process: ManagedProcess) {
        self.processes
            .write()
            .await
            .insert(process.info.process_id.clone(), process);
    }

    pub async fn take_process(&self, process_id: &str) -> Option<ManagedProcess> {
        self.processes.write().await.remove(process_id)
    }

    pub async fn process_handle(&self, process_id: &str) -> Option<ProcessHandle> {
        self.processes
            .read()
            .await
            .get(process_id)
            .map(|p| p.handle.clone())
    }

    pub async fn process_count(&self) -> usize {
        self.processes.read().await.len()
    }

    pub async fn process_infos(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self
            .processes
            .read()
            .await
            .values()
            .map(|p| p.info.clone())
            .collect();
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        infos
    }

    pub async fn process_handles(&self) -> Vec<(String, ProcessHandle)> {
        self.processes
            .read()
            .await
            .iter()
            .map(|(id, p)| (id.clone(), p.handle.clone()))
            .collect()
    }

    // ── idle sweep ──────────────────────────────────────────────────────

    /// Install a new sweep token, cancelling the previous one
    pub(crate) async fn replace_sweep(&self, token: Option<CancellationToken>) {
        let mut slot = self.idle_sweep.lock().await;
        if let Some(prev) = slot.take() {
            prev.cancel();
        }
        *slot = token;
    }

    pub async fn sweep_armed(&self) -> bool {
        self.idle_sweep
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            WorkspaceId::parse("demo").unwrap(),
            PathBuf::from("/tmp/demo"),
        )
    }

    #[tokio::test]
    async fn test_attach_detach_counts() {
        let s = session();
        let (a, _ra) = ConnectionHandle::new(None);
        let (b, _rb) = ConnectionHandle::new(None);
        let a_id = a.id;

        assert_eq!(s.attach(a).await, 1);
        assert_eq!(s.attach(b).await, 2);
        assert_eq!(s.detach(&a_id).await, 1);
        // detaching twice is harmless
        assert_eq!(s.detach(&a_id).await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_attached() {
        let s = session();
        let (a, mut ra) = ConnectionHandle::new(None);
        s.attach(a).await;

        let n = s
            .broadcast(&ServerMessage::RefreshPreview {
                preview_id: "demo".into(),
            })
            .await;
        assert_eq!(n, 1);
        assert!(ra.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_attach_and_ack_reports_count() {
        let s = session();
        let (a, mut ra) = ConnectionHandle::new(None);
        let (b, mut rb) = ConnectionHandle::new(None);
        s.attach_and_ack(a).await;
        assert_eq!(s.attach_and_ack(b).await, 2);

        let ack: serde_json::Value =
            serde_json::from_str(ra.try_recv().unwrap().as_str()).unwrap();
        assert_eq!(ack["type"], "connection-established");
        assert_eq!(ack["clientCount"], 1);

        let ack: serde_json::Value =
            serde_json::from_str(rb.try_recv().unwrap().as_str()).unwrap();
        assert_eq!(ack["clientCount"], 2);
        assert_eq!(ack["previewId"], "demo");
    }

    #[tokio::test]
    async fn test_evict_prefix() {
        let s = session();
        s.cache_file("a/b.txt", "1".into()).await;
        s.cache_file("a/c/d.txt", "2".into()).await;
        s.cache_file("ab.txt", "3".into()).await;
        s.cache_file("a", "4".into()).await;

        assert_eq!(s.evict_prefix("a").await, 3);
        assert_eq!(s.cached_file("ab.txt").await.as_deref(), Some("3"));
        assert!(s.cached_file("a/b.txt").await.is_none());
    }

    #[tokio::test]
    async fn test_replace_sweep_cancels_previous() {
        let s = session();
        let first = CancellationToken::new();
        s.replace_sweep(Some(first.clone())).await;
        assert!(s.sweep_armed().await);

        s.replace_sweep(None).await;
        assert!(first.is_cancelled());
        assert!(!s.sweep_armed().await);
    }
}
