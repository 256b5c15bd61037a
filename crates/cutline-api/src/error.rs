//! API error types.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use cutline_models::CutSpecError;
use cutline_queue::QueueError;
use cutline_worker::{LocateError, SourceError, WorkerError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidCutSpec(#[from] CutSpecError),

    #[error("{0}")]
    UnresolvableSource(String),

    #[error("{0}")]
    JobNotFound(String),

    #[error("{0}")]
    ArtifactNotFound(String),

    #[error("{0}")]
    ArtifactMissing(String),

    #[error("{0}")]
    JobNotCompleted(String),

    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { len: u64 },

    #[error("Request body is too large")]
    PayloadTooLarge,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    ProcessingFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn job_not_found(msg: impl Into<String>) -> Self {
        Self::JobNotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidCutSpec(_) | ApiError::UnresolvableSource(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::JobNotFound(_) | ApiError::ArtifactNotFound(_) | ApiError::ArtifactMissing(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::JobNotCompleted(_) => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ProcessingFailed(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidCutSpec(_) => "invalid_cut_spec",
            ApiError::UnresolvableSource(_) => "unresolvable_source",
            ApiError::JobNotFound(_) => "job_not_found",
            ApiError::ArtifactNotFound(_) => "artifact_not_found",
            ApiError::ArtifactMissing(_) => "artifact_missing",
            ApiError::JobNotCompleted(_) => "job_not_completed",
            ApiError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::RateLimited => "rate_limited",
            ApiError::ProcessingFailed(_) => "processing_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        if err.is_client_error() {
            ApiError::UnresolvableSource(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<LocateError> for ApiError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::JobNotFound(_) => ApiError::JobNotFound(err.to_string()),
            LocateError::JobNotCompleted { .. } => ApiError::JobNotCompleted(err.to_string()),
            LocateError::ArtifactNotFound(_) => ApiError::ArtifactNotFound(err.to_string()),
            LocateError::ArtifactMissing(_) => ApiError::ArtifactMissing(err.to_string()),
            LocateError::RangeNotSatisfiable { len } => ApiError::RangeNotSatisfiable { len },
            LocateError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        if err.is_not_found() {
            ApiError::JobNotFound(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            WorkerError::Source(e) => e.into(),
            WorkerError::CutSpec(e) => e.into(),
            WorkerError::Locate(e) => e.into(),
            WorkerError::Queue(e) => e.into(),
            WorkerError::JobFailed(_) | WorkerError::SegmentFailed(_) => {
                ApiError::ProcessingFailed(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }

        // Don't expose internal error details in production
        let error = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default().to_lowercase() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error,
            code: self.code(),
        });

        match self {
            ApiError::RangeNotSatisfiable { len } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", len))],
                body,
            )
                .into_response(),
            ApiError::RateLimited => (status, [(header::RETRY_AFTER, "1")], body).into_response(),
            _ => (status, body).into_response(),
        }
    }
}
