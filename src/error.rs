use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Please provide a valid email address")]
    InvalidEmail,

    #[error("This email is already on the waitlist")]
    DuplicateEmail,

    #[error("Too many attempts, please wait a few minutes before trying again")]
    RateLimited,

    #[error("Valid authentication is required")]
    Unauthorized,

    #[error("This method is not allowed on this endpoint")]
    MethodNotAllowed,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Store(StoreError::from(err))
    }
}

/// Every failure body carries a short machine code plus a human message.
/// Clients branch on the status code, not the `error` field.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidEmail => StatusCode::BAD_REQUEST,
            AppError::DuplicateEmail => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidEmail => "invalid_email",
            AppError::DuplicateEmail => "duplicate_email",
            AppError::RateLimited => "rate_limited",
            AppError::Unauthorized => "unauthorized",
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::Store(_) => "server_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Store failures are logged in full but surfaced as an opaque message.
        let message = match &self {
            AppError::Store(err) => {
                error!("store request failed: {err}");
                "There was an error processing your request, please try again".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.code(),
            message,
        };

        (self.status(), Json(body)).into_response()
    }
}
