use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorBody;

/// Errors returned by the HTTP handlers. Every variant maps to one status code
/// and is rendered as `{"detail": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid token")]
    MissingToken,

    #[error("Invalid API token")]
    InvalidToken,

    #[error("{0}")]
    BadRequest(String),

    #[error("Job not found")]
    JobNotFound,

    #[error("Render not finished")]
    NotFinished,

    #[error("Video file not found")]
    VideoMissing,

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound | ApiError::VideoMissing => StatusCode::NOT_FOUND,
            ApiError::NotFinished => StatusCode::ACCEPTED,
            ApiError::RenderFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, "{self}");
        } else {
            tracing::debug!(%status, "{self}");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("malformed payload: {error}"))
    }
}

impl From<TickerError> for ApiError {
    fn from(error: TickerError) -> Self {
        ApiError::BadRequest(error.to_string())
    }
}

impl From<RenderError> for ApiError {
    fn from(error: RenderError) -> Self {
        ApiError::Internal(error.to_string())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TickerError {
    #[error("no named entities given")]
    Empty,

    #[error("envelope width must be positive, got {0}")]
    InvalidWidth(f64),

    #[error("appearance end {end} precedes start {start}")]
    InvertedSpan { start: f64, end: f64 },

    #[error("cannot merge appearances of different terms `{left}` and `{right}`")]
    TermMismatch { left: String, right: String },

    #[error("cannot merge non-overlapping appearances `{left}` and `{right}`")]
    Disjoint { left: String, right: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode ticker: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("renderer timed out after {0}s")]
    Timeout(u64),

    #[error("renderer exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("renderer finished but produced no video at `{0}`")]
    NoOutput(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
