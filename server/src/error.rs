use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure is a terminal response to the single request: nothing is
/// retried, nothing is treated as transient.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid or missing credentials")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Validation failed")]
    Validation(BTreeMap<&'static str, Vec<String>>),

    #[error("Internal error: {0}")]
    Internal(#[from] sqlx::Error),
}

impl AppError {
    /// Single-field shorthand for the field-keyed validation map.
    pub fn field(name: &'static str, message: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(name, vec![message.to_string()]);
        AppError::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            AppError::Validation(errors) => json!(errors),
            AppError::Internal(e) => {
                error!("persistence failure: {e}");
                json!({ "detail": "Internal error" })
            }
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
