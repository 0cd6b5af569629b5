use analytics::AnalyticsError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use executor::ExecutorError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Converts our custom `AppError` into an HTTP response.
/// Storage and integrity details are logged, never returned.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Executor(ExecutorError::Validation(err)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            AppError::Executor(ExecutorError::AccountNotFound(account_id)) => (
                StatusCode::NOT_FOUND,
                format!("account {account_id} not found"),
            ),
            AppError::Executor(ExecutorError::Integrity(msg)) => {
                tracing::error!(error = %msg, "Integrity violation.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal integrity error occurred".to_string(),
                )
            }
            AppError::Executor(ExecutorError::Persistence(db_err)) => {
                tracing::error!(error = ?db_err, "Database error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::Analytics(analytics_err) => {
                tracing::error!(error = ?analytics_err, "Analytics error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while computing metrics".to_string(),
                )
            }
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
