//! Server error types.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::api::{ErrorResponse, STREAM_GENERATION, STREAM_TAIL_OFFSET};
use crate::storage::StorageError;

/// Errors that can occur running the HTTP server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Server error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Errors returned to HTTP clients.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Malformed request parameter.
    #[error("Invalid {name}: {value:?}")]
    BadRequest { name: &'static str, value: String },
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Storage(err) => match err {
                StorageError::UnknownStream(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidOffset { .. } => StatusCode::BAD_REQUEST,
                StorageError::StreamReset { .. } => StatusCode::CONFLICT,
                StorageError::StreamGone { .. } => StatusCode::GONE,
                StorageError::DirectoryMissing(_)
                | StorageError::WatcherFailure(_)
                | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable error code for the response body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Storage(err) => match err {
                StorageError::UnknownStream(_) => "unknown_stream",
                StorageError::InvalidOffset { .. } => "invalid_offset",
                StorageError::StreamReset { .. } => "stream_reset",
                StorageError::StreamGone { .. } => "stream_gone",
                StorageError::DirectoryMissing(_)
                | StorageError::WatcherFailure(_)
                | StorageError::Io(_) => "internal",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Stream request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Stream request rejected");
        }

        // A reset tells the client where the new generation starts
        let mut headers = HeaderMap::new();
        if let Self::Storage(StorageError::StreamReset {
            generation, size, ..
        }) = &self
        {
            headers.insert(STREAM_GENERATION, (*generation).into());
            headers.insert(STREAM_TAIL_OFFSET, (*size).into());
        }

        let body = ErrorResponse::new(self.code(), self.to_string());
        (status, headers, Json(body)).into_response()
    }
}
