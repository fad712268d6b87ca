//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while observing the session directory.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Watched directory does not exist.
    #[error("Watched directory missing: {0}")]
    DirectoryMissing(PathBuf),

    /// Permission denied accessing the directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Polling requires a tokio runtime.
    #[error("No tokio runtime available for polling")]
    NoRuntime,

    /// Event channel closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,
}
