use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Error taxonomy shared by the registry, file store and supervisor.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Unknown workspace, process or file
    #[error("{0} not found")]
    NotFound(String),

    /// Missing or malformed input
    #[error("{0}")]
    InvalidArgument(String),

    #[error("storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The process could not be created. A completion event has already been broadcast.
    #[error("failed to spawn process {process_id}: {reason}")]
    Spawn { process_id: String, reason: String },
}

pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        HubError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Map an I/O error on `what`, turning `ErrorKind::NotFound` into `HubError::NotFound`
    pub fn from_io(what: &str, context: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            HubError::NotFound(what.to_string())
        } else {
            HubError::storage(context, source)
        }
    }

    /// Stable machine-readable kind used in error bodies and `error` events
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::NotFound(_) => "not-found",
            HubError::InvalidArgument(_) => "invalid-argument",
            HubError::Storage { .. } => "storage-error",
            HubError::Spawn { .. } => "spawn-error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            HubError::Storage { .. } | HubError::Spawn { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        }

        let mut body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let HubError::Spawn { process_id, .. } = &self {
            body["processId"] = serde_json::Value::String(process_id.clone());
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_not_found() {
        let err = HubError::from_io(
            "a.txt",
            "reading a.txt",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, HubError::NotFound(ref what) if what == "a.txt"));

        let err = HubError::from_io(
            "a.txt",
            "reading a.txt",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, HubError::Storage { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let resp = HubError::InvalidArgument("path is required".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid-argument");
        assert_eq!(json["message"], "path is required");
    }

    #[tokio::test]
    async fn test_spawn_error_carries_process_id() {
        let resp = HubError::Spawn {
            process_id: "p-1".into(),
            reason: "no such file".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["processId"], "p-1");
        assert_eq!(json["error"], "spawn-error");
    }
}
