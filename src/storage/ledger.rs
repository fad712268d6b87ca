//! Per-stream offset bookkeeping.
//!
//! A [`LedgerEntry`] records what is known about a stream's backing file:
//! its size, how many times it has been truncated or rewritten, the
//! largest size ever observed, and which file currently backs it. All read
//! validation is decided here.

use file_id::FileId;

use super::error::StorageError;
use crate::stream_id::StreamId;

/// Whether the backing file currently exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Live,
    Gone,
}

/// Snapshot of a stream's offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Current known size in bytes.
    pub size: u64,
    /// Number of truncations/rewrites observed.
    pub generation: u64,
    /// Largest size ever observed across generations.
    pub high_water: u64,
    /// Backing file status.
    pub status: StreamStatus,
    /// Identity of the file last observed at the stream's path.
    pub identity: Option<FileId>,
}

/// What an observation did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Unchanged,
    Grew { from: u64, to: u64 },
    Truncated { from: u64, to: u64 },
    Removed,
    Restored { size: u64 },
    /// A different file now sits at the stream's path.
    Replaced { size: u64 },
}

impl Advance {
    /// Whether waiters must be woken.
    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A reader's resume point.
///
/// The generation is optional. Without it only offset zero survives a
/// rewrite; every other offset is reported as a reset once the stream has
/// been rewritten at least once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub offset: u64,
    pub generation: Option<u64>,
}

impl Position {
    #[must_use]
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            generation: None,
        }
    }

    /// Pin the position to a generation.
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }
}

impl From<u64> for Position {
    fn from(offset: u64) -> Self {
        Self::new(offset)
    }
}

/// Outcome of validating a position against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Bytes are available between the position and `entry.size`.
    Behind(LedgerEntry),
    /// The position is at the tail; nothing to read yet.
    AtTail(LedgerEntry),
}

impl LedgerEntry {
    /// A live entry for a file of `size` bytes.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            generation: 0,
            high_water: size,
            status: StreamStatus::Live,
            identity: None,
        }
    }

    /// Attach the identity of the backing file.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<FileId>) -> Self {
        self.identity = identity;
        self
    }

    /// Record a freshly observed size for a stream without file identity.
    pub fn observe(&mut self, size: u64) -> Advance {
        self.observe_file(size, None)
    }

    /// Record a freshly observed file size and identity.
    ///
    /// Growth advances the size. A shrink bumps the generation and adopts
    /// the new size. A file reappearing after removal, or a different file
    /// renamed over the path, is a rewrite. An unknown identity never
    /// counts as a replacement.
    pub fn observe_file(&mut self, size: u64, identity: Option<FileId>) -> Advance {
        if self.status == StreamStatus::Gone {
            self.status = StreamStatus::Live;
            self.rewrite(size);
            self.identity = identity.or(self.identity);
            return Advance::Restored { size };
        }

        let replaced = matches!(
            (self.identity, identity),
            (Some(known), Some(seen)) if known != seen
        );
        if identity.is_some() {
            self.identity = identity;
        }
        if replaced {
            self.rewrite(size);
            return Advance::Replaced { size };
        }

        let from = self.size;
        if size > from {
            self.size = size;
            self.high_water = self.high_water.max(size);
            Advance::Grew { from, to: size }
        } else if size < from {
            self.size = size;
            self.generation += 1;
            Advance::Truncated { from, to: size }
        } else {
            Advance::Unchanged
        }
    }

    fn rewrite(&mut self, size: u64) {
        self.generation += 1;
        self.size = size;
        self.high_water = self.high_water.max(size);
    }

    /// Record that the backing file no longer exists.
    pub fn mark_gone(&mut self) -> Advance {
        if self.status == StreamStatus::Gone {
            return Advance::Unchanged;
        }
        self.status = StreamStatus::Gone;
        Advance::Removed
    }

    /// Validate a read position.
    ///
    /// # Errors
    ///
    /// - `StreamGone` once the backing file is removed, for every offset.
    /// - `StreamReset` on a generation mismatch, or for a nonzero offset
    ///   without a generation once the stream has been rewritten.
    /// - `InvalidOffset` for an offset no generation ever reached.
    pub fn classify(&self, stream_id: &StreamId, position: Position) -> Result<Readiness, StorageError> {
        if self.status == StreamStatus::Gone {
            return Err(StorageError::StreamGone {
                stream_id: stream_id.clone(),
                size: self.size,
            });
        }

        let offset = position.offset;
        let stale = match position.generation {
            Some(generation) => generation != self.generation,
            // An unpinned offset may predate a rewrite
            None => self.generation > 0 && offset != 0 && offset <= self.high_water,
        };

        if stale {
            return Err(self.reset_error(stream_id));
        }

        if offset > self.size {
            return Err(StorageError::InvalidOffset {
                stream_id: stream_id.clone(),
                offset,
                size: self.size,
            });
        }

        if offset < self.size {
            Ok(Readiness::Behind(*self))
        } else {
            Ok(Readiness::AtTail(*self))
        }
    }

    #[must_use]
    pub fn reset_error(&self, stream_id: &StreamId) -> StorageError {
        StorageError::StreamReset {
            stream_id: stream_id.clone(),
            generation: self.generation,
            size: self.size,
        }
    }
}
