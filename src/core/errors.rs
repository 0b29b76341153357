// src/core/errors.rs

//! Defines the primary error type for the entire application.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations.
#[derive(Error, Debug, Clone)]
pub enum S4Error {
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl S4Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            S4Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            S4Error::NotFound(_) => StatusCode::NOT_FOUND,
            S4Error::Conflict(_) => StatusCode::CONFLICT,
            S4Error::Throttled(_) => StatusCode::TOO_MANY_REQUESTS,
            S4Error::Io(_) | S4Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for S4Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

impl From<std::io::Error> for S4Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => S4Error::NotFound(e.to_string()),
            _ => S4Error::Io(Arc::new(e)),
        }
    }
}

impl From<reqwest::Error> for S4Error {
    fn from(e: reqwest::Error) -> Self {
        S4Error::Internal(format!("http client error: {e}"))
    }
}

impl From<uuid::Error> for S4Error {
    fn from(e: uuid::Error) -> Self {
        S4Error::Internal(format!("failed to parse uuid: {e}"))
    }
}

impl From<serde_json::Error> for S4Error {
    fn from(e: serde_json::Error) -> Self {
        S4Error::BadRequest(format!("invalid json: {e}"))
    }
}

impl From<tokio::task::JoinError> for S4Error {
    fn from(e: tokio::task::JoinError) -> Self {
        S4Error::Internal(format!("task join error: {e}"))
    }
}
