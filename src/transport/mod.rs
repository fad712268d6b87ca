//! HTTP transport for session streams.

mod api;
mod error;
mod handlers;
mod server;

pub use api::{
    ErrorResponse, LiveMode, StreamQuery, LIVE_LONG_POLL, NDJSON, STREAM_GENERATION,
    STREAM_NEXT_OFFSET, STREAM_OFFSET, STREAM_TAIL_OFFSET, STREAM_UP_TO_DATE,
};
pub use error::{ApiError, ServerError};
pub use handlers::AppState;
pub use server::StreamServer;
