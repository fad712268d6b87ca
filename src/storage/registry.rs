//! Stream registry.
//!
//! Maps stream identifiers to their backing file, ledger and waiters.
//! Streams are only ever added; a stream whose file disappears stays
//! registered with a `Gone` ledger.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::error::StorageError;
use super::history::{HistoryEntry, MemoryLog};
use super::ledger::{Advance, LedgerEntry};
use super::notifier::TailNotifier;
use super::reader::FileStat;
use crate::stream_id::StreamId;

/// Where a stream's bytes live.
#[derive(Debug)]
pub(crate) enum Backing {
    File(PathBuf),
    Memory(MemoryLog),
}

#[derive(Debug)]
struct StreamState {
    id: StreamId,
    index: Option<u64>,
    backing: Backing,
    notifier: TailNotifier,
}

/// Shared handle to a registered stream.
///
/// Cloning is cheap; all clones refer to the same ledger and waiters.
#[derive(Debug, Clone)]
pub struct StreamHandle(Arc<StreamState>);

impl StreamHandle {
    fn new(id: StreamId, index: Option<u64>, backing: Backing, entry: LedgerEntry) -> Self {
        Self(Arc::new(StreamState {
            id,
            index,
            backing,
            notifier: TailNotifier::new(entry),
        }))
    }

    #[must_use]
    pub fn id(&self) -> &StreamId {
        &self.0.id
    }

    /// Discovery order index; `None` for the discovery stream itself.
    #[must_use]
    pub fn index(&self) -> Option<u64> {
        self.0.index
    }

    /// Backing file path; `None` for the discovery stream.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.0.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Current ledger snapshot.
    #[must_use]
    pub fn entry(&self) -> LedgerEntry {
        self.0.notifier.current()
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.entry().size
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.entry().generation
    }

    /// Number of readers parked on this stream.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.0.notifier.waiters()
    }

    /// Whether two handles refer to the same registered stream.
    #[must_use]
    pub fn same_stream(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn notifier(&self) -> &TailNotifier {
        &self.0.notifier
    }

    pub(crate) fn backing(&self) -> &Backing {
        &self.0.backing
    }

    pub(crate) fn observe_file(&self, stat: FileStat) -> Advance {
        self.0
            .notifier
            .update(|entry| entry.observe_file(stat.len, stat.identity))
    }

    pub(crate) fn mark_gone(&self) -> Advance {
        self.0.notifier.update(LedgerEntry::mark_gone)
    }

    /// Append to an in-memory stream and wake its waiters.
    fn append(&self, data: &[u8]) {
        if let Backing::Memory(log) = &self.0.backing {
            let size = log.append(data);
            self.0.notifier.update(|entry| entry.observe(size));
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamId, StreamHandle>,
    order: Vec<StreamId>,
}

/// Registry of every stream observed during this process lifetime.
#[derive(Debug)]
pub struct StreamRegistry {
    inner: RwLock<Inner>,
    history: StreamHandle,
}

impl StreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            history: StreamHandle::new(
                StreamId::history(),
                None,
                Backing::Memory(MemoryLog::new()),
                LedgerEntry::new(0),
            ),
        }
    }

    /// Look up a stream by identifier.
    ///
    /// Unobserved identifiers are never created speculatively.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStream` if no file with this identifier was observed.
    pub fn resolve(&self, id: &str) -> Result<StreamHandle, StorageError> {
        if id == self.history.id().as_str() {
            return Ok(self.history.clone());
        }

        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .streams
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::UnknownStream(id.to_string()))
    }

    /// Register a session stream, or return the existing one.
    ///
    /// Returns the handle and whether it was newly created. A new stream
    /// is appended to the discovery stream under the same lock, so
    /// discovery order always matches registration order.
    pub fn ensure(&self, id: StreamId, path: PathBuf, stat: FileStat) -> (StreamHandle, bool) {
        debug_assert!(!id.is_history(), "the discovery stream is built in");

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inner.streams.get(&id) {
            return (existing.clone(), false);
        }

        let index = inner.order.len() as u64;
        let entry = LedgerEntry::new(stat.len).with_identity(stat.identity);
        let handle = StreamHandle::new(id.clone(), Some(index), Backing::File(path), entry);
        inner.streams.insert(id.clone(), handle.clone());
        inner.order.push(id.clone());

        self.history.append(&HistoryEntry::new(id, index).to_line());

        (handle, true)
    }

    /// Session identifiers in discovery order.
    #[must_use]
    pub fn list(&self) -> Vec<StreamId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// Handles of every session stream in discovery order.
    #[must_use]
    pub fn sessions(&self) -> Vec<StreamHandle> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.streams.get(id).cloned())
            .collect()
    }

    /// The discovery stream.
    #[must_use]
    pub fn history(&self) -> &StreamHandle {
        &self.history
    }

    /// Number of session streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
