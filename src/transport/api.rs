//! Wire types for the stream HTTP endpoints.

use axum::http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::storage::Position;

/// Request header carrying the offset to read from.
pub const STREAM_OFFSET: HeaderName = HeaderName::from_static("stream-offset");
/// Request and response header carrying the stream generation.
pub const STREAM_GENERATION: HeaderName = HeaderName::from_static("stream-generation");
/// Response header: offset to resume from.
pub const STREAM_NEXT_OFFSET: HeaderName = HeaderName::from_static("stream-next-offset");
/// Response header: known stream size.
pub const STREAM_TAIL_OFFSET: HeaderName = HeaderName::from_static("stream-tail-offset");
/// Response header: whether the response reached the tail.
pub const STREAM_UP_TO_DATE: HeaderName = HeaderName::from_static("stream-up-to-date");

/// Content type of stream bodies.
pub const NDJSON: &str = "application/x-ndjson";

/// Value of the `live` query parameter that enables long-polling.
pub const LIVE_LONG_POLL: &str = "long-poll";

/// How a request waits at the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMode {
    /// Return immediately, possibly with no data.
    CatchUp,
    /// Park at the tail until data arrives or the timeout elapses.
    LongPoll,
}

/// Query parameters for `GET /{stream_id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub generation: Option<String>,
}

impl StreamQuery {
    /// Resolve the read position from query parameters and headers.
    ///
    /// The `Stream-Offset` header wins over the `offset` parameter; a
    /// missing offset means the start of the stream.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if an offset or generation is not a number.
    pub fn position(&self, headers: &HeaderMap) -> Result<Position, ApiError> {
        let offset = match header_str(headers, &STREAM_OFFSET)?.or(self.offset.as_deref()) {
            Some(value) => parse_number("offset", value)?,
            None => 0,
        };

        let position = Position::new(offset);
        match header_str(headers, &STREAM_GENERATION)?.or(self.generation.as_deref()) {
            Some(value) => Ok(position.with_generation(parse_number("generation", value)?)),
            None => Ok(position),
        }
    }

    /// # Errors
    ///
    /// Returns `BadRequest` for an unsupported `live` value.
    pub fn live_mode(&self) -> Result<LiveMode, ApiError> {
        match self.live.as_deref() {
            None | Some("") => Ok(LiveMode::CatchUp),
            Some(LIVE_LONG_POLL) => Ok(LiveMode::LongPoll),
            Some(other) => Err(ApiError::BadRequest {
                name: "live",
                value: other.to_string(),
            }),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value.to_str().map_err(|_| ApiError::BadRequest {
                name: "header",
                value: name.to_string(),
            })
        })
        .transpose()
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ApiError> {
    value.trim().parse().map_err(|_| ApiError::BadRequest {
        name,
        value: value.to_string(),
    })
}

/// JSON body of an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable error code.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
