use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error type returned by every handler.
///
/// Converted into the uniform `{ statusCode, message, success: false, .. }`
/// envelope by its [`IntoResponse`] impl, which is the single outer error
/// boundary of the service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Client input defect.
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    /// A required asset could not be uploaded.
    #[error("{0}")]
    Upload(String),

    /// Post-write consistency anomaly.
    #[error("{0}")]
    Internal(String),

    /// Anything else.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub data: Option<()>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Unhandled(e) => {
                tracing::error!(error = ?e, "unhandled error");
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            message,
            success: false,
            errors: Vec::new(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}
