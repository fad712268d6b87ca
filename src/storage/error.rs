//! Storage error types.

use std::path::PathBuf;

use crate::stream_id::StreamId;
use crate::watcher::WatcherError;

/// Errors returned by the storage adapter.
///
/// Each read failure is its own variant because clients react differently:
/// re-discover, restart from zero, or give up.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// The stream has never been observed.
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// The requested offset is ahead of the stream.
    #[error("Offset {offset} is beyond the end of stream {stream_id} (size {size})")]
    InvalidOffset {
        stream_id: StreamId,
        offset: u64,
        size: u64,
    },

    /// The backing file shrank or was rewritten; prior offsets are invalid.
    #[error("Stream {stream_id} was reset (generation {generation}, size {size}); restart from offset 0")]
    StreamReset {
        stream_id: StreamId,
        generation: u64,
        size: u64,
    },

    /// The backing file was removed.
    #[error("Stream {stream_id} is gone; its file was removed at size {size}")]
    StreamGone { stream_id: StreamId, size: u64 },

    /// The session directory does not exist.
    #[error("Session directory not found: {0}")]
    DirectoryMissing(PathBuf),

    /// Filesystem observation could not be established.
    #[error("Watcher failure: {0}")]
    WatcherFailure(#[from] WatcherError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
