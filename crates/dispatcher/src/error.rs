use axum::response::{IntoResponse, Response};
use axum::Json;

use simdock_core::protocol::StatusReply;
use simdock_core::CoreError;

/// Application-level error type for command handlers.
///
/// Wraps [`CoreError`] for domain errors and adds dispatcher-specific
/// variants. The wire contract replies HTTP 200 with
/// `{Status: "error", Message}` for application failures; the `Status`
/// field is authoritative, so `IntoResponse` always produces that shape.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `simdock-core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The queue store refused a query.
    #[error("Store error: {0}")]
    Database(#[from] sqlx::Error),

    /// A malformed envelope, payload, or upload.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Create/rename/read of a staged or archived file failed.
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Tar extraction failed after retries. The item stays `Completed`
    /// and is eligible for another `EndSimulation` attempt.
    #[error("Archive error: {0}")]
    Archive(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Core(CoreError::NotFound { .. }) | AppError::BadRequest(_) => {
                tracing::warn!(error = %self, "Command rejected");
            }
            other => {
                tracing::error!(error = %other, "Command failed");
            }
        }
        Json(StatusReply::error(self.to_string())).into_response()
    }
}
