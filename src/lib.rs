//! Claude Streams - Session logs as resumable, live-tailable streams.

pub mod config;
pub mod storage;
pub mod stream_id;
pub mod transport;
pub mod watcher;

pub use stream_id::{StreamId, HISTORY_STREAM_ID};
