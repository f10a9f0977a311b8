use crate::services::storage::StorageError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Terminal per-request outcomes decided by the gatekeeper or the dispatcher.
///
/// Each variant maps to one fixed status and a plain-text body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Bot requests are not allowed")]
    Bot,
    #[error("This API is not meant to be accessed from a browser.")]
    Malformed,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Object Not Found")]
    NotFound,
    #[error("Method Not Allowed")]
    MethodNotAllowed,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::Bot | Rejection::Malformed => StatusCode::FORBIDDEN,
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.to_string()).into_response();
        let headers = response.headers_mut();
        match self {
            Rejection::Malformed => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            }
            Rejection::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("PUT, GET, DELETE"));
            }
            _ => {}
        }
        response
    }
}

/// A lightweight wrapper for unexpected failures that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Store failures are logged in full and surfaced as an opaque 500.
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!("object store failure: {}", err);
        AppError::internal("object store failure")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn rejections_carry_fixed_status_and_headers() {
        let resp = Rejection::Malformed.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain");

        let resp = Rejection::MethodNotAllowed.into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()[header::ALLOW], "PUT, GET, DELETE");

        assert_eq!(Rejection::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Rejection::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(Rejection::Bot.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn storage_errors_become_opaque_500() {
        let err: AppError = StorageError::Io(io::Error::other("disk on fire")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("disk on fire"));
    }
}
