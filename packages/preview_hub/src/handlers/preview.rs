//! Static serving of workspace files at `/preview/{id}/...`.
//!
//! Reads straight from disk so a preview keeps working after its session has
//! been swept.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::workspace_id;
use crate::AppState;
use crate::error::{HubError, HubResult};
use crate::files::RelPath;

const INDEX_FILE: &str = "index.html";

pub async fn serve_preview_root(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HubResult<Response> {
    serve(&state, &id, "").await
}

pub async fn serve_preview_file(
    State(state): State<AppState>,
    Path((id, path)): Path<(String, String)>,
) -> HubResult<Response> {
    serve(&state, &id, &path).await
}

async fn serve(state: &AppState, id: &str, raw_path: &str) -> HubResult<Response> {
    let id = workspace_id(id)?;
    let path = RelPath::parse(raw_path)?;

    let mut target = path.resolve(&state.registry.root().join(id.as_str()));
    let is_dir = tokio::fs::metadata(&target)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        target.push(INDEX_FILE);
    }

    let bytes = tokio::fs::read(&target).await.map_err(|e| {
        HubError::from_io(&format!("preview file {path}"), format!("serving {path}"), e)
    })?;

    let mime = mime_guess::from_path(&target).first_or_octet_stream();
    debug!(preview_id = %id, path = %path, mime = %mime, "Serving preview file");

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::{send, test_router};
    use axum::http::{StatusCode, header};

    async fn put(app: &axum::Router, path: &str, content: &str) {
        let body = serde_json::json!({ "path": path, "content": content }).to_string();
        let resp = send(app, "PUT", "/api/previews/site/files", Some(&body)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serves_index_for_root() {
        let (app, _tmp) = test_router().await;
        put(&app, "index.html", "<h1>hello</h1>").await;

        for uri in ["/preview/site/", "/preview/site"] {
            let resp = send(&app, "GET", uri, None).await;
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
            let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&body[..], b"<h1>hello</h1>");
        }
    }

    #[tokio::test]
    async fn test_serves_nested_with_mime() {
        let (app, _tmp) = test_router().await;
        put(&app, "css/site.css", "body{}").await;
        put(&app, "docs/index.html", "docs").await;

        let resp = send(&app, "GET", "/preview/site/css/site.css", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/css");

        let resp = send(&app, "GET", "/preview/site/docs/", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let (app, _tmp) = test_router().await;
        put(&app, "index.html", "x").await;
        let resp = send(&app, "GET", "/preview/site/missing.js", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, "GET", "/preview/ghost/", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
