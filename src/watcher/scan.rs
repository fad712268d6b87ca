//! Session directory scanning.
//!
//! Lists the session log files currently present in the watched directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use file_id::FileId;

use super::error::WatcherError;
use crate::stream_id::StreamId;

/// A session log file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    /// Stream identifier derived from the file name.
    pub id: StreamId,
    /// Full path to the file.
    pub path: PathBuf,
    /// File size in bytes at scan time.
    pub len: u64,
    /// Device and inode (or volume and index) of the file, if available.
    pub identity: Option<FileId>,
    /// Last modification time (epoch if unavailable).
    pub modified: SystemTime,
}

/// Scan a directory for session log files.
///
/// Only regular files named `<uuid>.jsonl` are returned, sorted by
/// modification time and then by identifier, oldest first. Files that
/// disappear while the scan runs are skipped.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn scan_sessions(dir: &Path) -> Result<Vec<SessionFile>, WatcherError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WatcherError::DirectoryMissing(dir.to_path_buf()));
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(WatcherError::PermissionDenied(dir.to_path_buf()));
        }
        Err(e) => return Err(WatcherError::Io(e)),
    };

    let mut sessions: Vec<SessionFile> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let id = StreamId::from_session_path(&path)?;
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            Some(SessionFile {
                id,
                identity: file_id::get_file_id(&path).ok(),
                path,
                len: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            })
        })
        .collect();

    sessions.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.cmp(&b.id)));
    Ok(sessions)
}
