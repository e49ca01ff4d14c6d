//! Server-specific error types
//!
//! Callers only ever see a generic message per error class; the detail
//! carried by each variant goes to the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cifp_enhance::EnhanceError;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::{auth::AuthError, db::StoreError};

/// Terminal failure of a process run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing credentials")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream feed lists no editions")]
    NoEditionsAvailable,

    #[error("Metadata store error: {0}")]
    MetadataStore(#[source] StoreError),

    #[error("Archive write failed: {0}")]
    ArchiveWrite(String),

    #[error("Archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("Archive has no entry ending with '{member}'")]
    MemberNotFound { member: String },

    #[error("Transform failed: {0}")]
    Transform(#[source] EnhanceError),

    #[error("Process run exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("Scratch file error: {0}")]
    Scratch(#[source] std::io::Error),
}

impl From<AuthError> for PipelineError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => PipelineError::Unauthenticated,
            AuthError::Forbidden(reason) => PipelineError::Forbidden(reason),
        }
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PipelineError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::Unauthenticated => "Authentication required",
            PipelineError::Forbidden(_) => "Access denied",
            PipelineError::UpstreamUnavailable(_) => "Upstream CIFP feed unavailable",
            PipelineError::NoEditionsAvailable => "No CIFP editions available",
            PipelineError::MetadataStore(_) => "A metadata store error occurred",
            PipelineError::ArchiveWrite(_) => "Failed to archive CIFP data",
            PipelineError::ArchiveCorrupt(_) => "CIFP archive is corrupt",
            PipelineError::MemberNotFound { .. } => "CIFP data file missing from archive",
            PipelineError::Transform(_) => "Failed to process CIFP data",
            PipelineError::Timeout(_) => "Processing timed out",
            PipelineError::Scratch(_) => "An IO error occurred",
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "message": message,
            "status": status.as_u16(),
        }
    }));

    (status, body).into_response()
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.public_message())
    }
}

/// Errors from the read-only endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Cycle store error: {0}")]
    Store(#[from] StoreError),

    #[error("Request exceeded its {0:?} deadline")]
    Timeout(Duration),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            ApiError::Store(ref e) => {
                tracing::error!(error = %e, "Cycle listing failed");
                "A database error occurred"
            },
            ApiError::Timeout(ref deadline) => {
                tracing::error!(?deadline, "Cycle listing timed out");
                "Request timed out"
            },
        };

        error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_auth_failures_map_to_401_and_403() {
        let response = PipelineError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = PipelineError::from(AuthError::Forbidden("nope".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Access denied");
        assert_eq!(body["error"]["status"], 403);
    }

    #[tokio::test]
    async fn test_internal_detail_is_not_exposed() {
        let err = PipelineError::ArchiveWrite("s3://faa-cifp-data secret detail".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Failed to archive CIFP data");
        assert!(!body.to_string().contains("secret detail"));
    }

    #[test]
    fn test_every_other_class_is_500() {
        let errors = [
            PipelineError::UpstreamUnavailable("503".into()),
            PipelineError::NoEditionsAvailable,
            PipelineError::ArchiveCorrupt("bad".into()),
            PipelineError::MemberNotFound { member: "FAACIFP18".into() },
            PipelineError::Timeout(Duration::from_secs(120)),
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
