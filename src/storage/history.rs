//! Discovery stream content.
//!
//! The discovery stream is an in-memory append-only log with one JSON line
//! per discovered session, in discovery order.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream_id::StreamId;

/// One line of the discovery stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Session stream identifier.
    pub id: StreamId,
    /// Zero-based discovery index.
    pub index: u64,
    /// When this process first observed the session.
    pub discovered_at: DateTime<Utc>,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(id: StreamId, index: u64) -> Self {
        Self {
            id,
            index,
            discovered_at: Utc::now(),
        }
    }

    /// Encode as a newline-terminated JSON line.
    #[must_use]
    pub fn to_line(&self) -> Vec<u8> {
        // Serializing plain strings and integers cannot fail
        let mut line = serde_json::to_vec(self).unwrap_or_default();
        line.push(b'\n');
        line
    }
}

/// Append-only byte log held in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    bytes: RwLock<Vec<u8>>,
}

impl MemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes, returning the new size.
    pub fn append(&self, data: &[u8]) -> u64 {
        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(data);
        bytes.len() as u64
    }

    /// Copy out `[start, end)`, clamped to the current length.
    #[must_use]
    pub fn read_range(&self, start: u64, end: u64) -> Vec<u8> {
        let bytes = self.bytes.read().unwrap_or_else(PoisonError::into_inner);
        let len = bytes.len();
        let start = usize::try_from(start).unwrap_or(len).min(len);
        let end = usize::try_from(end).unwrap_or(len).clamp(start, len);
        bytes[start..end].to_vec()
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.read().unwrap_or_else(PoisonError::into_inner).len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
