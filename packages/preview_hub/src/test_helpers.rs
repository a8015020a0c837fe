use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use std::time::Duration;
use tower::ServiceExt;

use crate::AppState;
use crate::config::{FileConfig, HubConfig, HubDirs};

/// Build a fully-wired `AppState` rooted in a fresh temp directory.
///
/// Returns `(AppState, TempDir)`; callers **must** hold the `TempDir` for
/// the lifetime of the test so the workspace root stays valid.
pub async fn test_app_state() -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dirs = HubDirs::new(Some(tmp.path().to_path_buf())).expect("dirs");
    let mut config = HubConfig::from_file(&FileConfig::default(), &dirs);
    config.workspace.idle_grace = Duration::from_secs(300);
    (AppState::new(&config), tmp)
}

pub async fn test_router() -> (Router, tempfile::TempDir) {
    let (state, tmp) = test_app_state().await;
    (crate::build_router(state), tmp)
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
