use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::AppError;
use crate::payments::validation::ValidationErrors;

/// `{status: "error", message, errors?}` envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Option<ValidationErrors>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, AppError::NotFound.to_string())
    }

    pub fn invalid(errors: ValidationErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid payment data".to_string(),
            errors: Some(errors),
        }
    }

    /// Log `err` and answer with `message` only
    pub fn internal(message: impl Into<String>, err: &AppError) -> Self {
        let message = message.into();
        error!(error = %err, "{}", message);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Map a lifecycle error, using `fallback` as the client-facing message
    /// for anything that is not the caller's fault.
    pub fn from_app(err: AppError, fallback: &str) -> Self {
        match err {
            AppError::Validation(errors) => Self::invalid(errors),
            AppError::NotFound => Self::not_found(),
            AppError::CaptureTargetMissing { .. } => Self::bad_request(err.to_string()),
            AppError::InvalidTransition { .. }
            | AppError::ReferenceAlreadyAssigned { .. }
            | AppError::Conflict { .. } => Self::new(StatusCode::CONFLICT, err.to_string()),
            AppError::Gateway(_) | AppError::Database(_) => Self::internal(fallback, &err),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::from_app(err, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            status: "error",
            message: self.message,
            errors: self.errors,
        });

        (self.status, body).into_response()
    }
}
