//! HTTP handlers for the stream endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use tokio_util::sync::CancellationToken;

use super::api::{
    LiveMode, StreamQuery, NDJSON, STREAM_GENERATION, STREAM_NEXT_OFFSET, STREAM_TAIL_OFFSET,
    STREAM_UP_TO_DATE,
};
use super::error::ApiError;
use crate::storage::{ReadOutcome, Readiness, Storage};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session log storage.
    pub storage: Arc<Storage>,
    /// Fires on server shutdown; releases parked long-polls.
    pub cancel: CancellationToken,
    /// Where `/` redirects to.
    pub ui_path: String,
}

/// GET /{stream_id} - Read a stream from an offset, optionally long-polling.
///
/// HEAD returns the same headers without reading any bytes.
pub async fn get_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(query): Query<StreamQuery>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let position = query.position(&headers)?;

    if method == Method::HEAD {
        let handle = state.storage.resolve(&stream_id)?;
        let entry = match handle.entry().classify(handle.id(), position)? {
            Readiness::Behind(entry) | Readiness::AtTail(entry) => entry,
        };
        let outcome = ReadOutcome {
            data: Vec::new(),
            next_offset: position.offset,
            tail_offset: entry.size,
            generation: entry.generation,
            up_to_date: entry.size == position.offset,
            timed_out: false,
        };
        return Ok(stream_response(outcome));
    }

    // A client disconnect drops this future, which releases the waiter
    let outcome = match query.live_mode()? {
        LiveMode::LongPoll => {
            state
                .storage
                .wait(&stream_id, position, &state.cancel)
                .await?
        }
        LiveMode::CatchUp => state.storage.read(&stream_id, position).await?,
    };

    tracing::trace!(
        stream_id = %stream_id,
        offset = position.offset,
        bytes = outcome.data.len(),
        timed_out = outcome.timed_out,
        "Served stream read"
    );

    Ok(stream_response(outcome))
}

/// GET / - Redirect to the UI.
pub async fn redirect_root(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.ui_path)
}

fn stream_response(outcome: ReadOutcome) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(STREAM_NEXT_OFFSET, outcome.next_offset.into());
    headers.insert(STREAM_TAIL_OFFSET, outcome.tail_offset.into());
    headers.insert(STREAM_GENERATION, outcome.generation.into());
    headers.insert(
        STREAM_UP_TO_DATE,
        HeaderValue::from_static(if outcome.up_to_date { "true" } else { "false" }),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    if outcome.timed_out {
        return (StatusCode::NO_CONTENT, headers).into_response();
    }

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    (StatusCode::OK, headers, outcome.data).into_response()
}
