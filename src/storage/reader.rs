//! Byte-range reads from session log files.
//!
//! Content is copied verbatim; lines are never parsed.

use std::io::SeekFrom;
use std::path::Path;

use file_id::FileId;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read exactly `[start, end)` from the file at `path`.
///
/// # Errors
///
/// - `NotFound` if the file was removed.
/// - `UnexpectedEof` if the file is now shorter than `end`, i.e. it was
///   truncated after its size was last observed.
/// - Any other I/O error from opening, seeking, or reading.
pub async fn read_file_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let len = usize::try_from(end.saturating_sub(start)).map_err(std::io::Error::other)?;
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;

    let mut buf = vec![0; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Size and identity of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    /// `None` where the platform cannot report one.
    pub identity: Option<FileId>,
}

/// Stat a regular file, or `None` if it does not exist.
///
/// # Errors
///
/// Returns I/O errors other than `NotFound`.
pub async fn stat_file(path: &Path) -> std::io::Result<Option<FileStat>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || stat_file_blocking(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn stat_file_blocking(path: &Path) -> std::io::Result<Option<FileStat>> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(Some(FileStat {
            len: metadata.len(),
            identity: file_id::get_file_id(path).ok(),
        })),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
