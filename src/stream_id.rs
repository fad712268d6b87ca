//! Stream identifiers.
//!
//! Session streams are named after the session log file stem
//! (`<uuid>.jsonl`). One reserved identifier names the discovery stream.

use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved identifier of the discovery stream.
pub const HISTORY_STREAM_ID: &str = "_history";

/// File extension of session log files.
pub const SESSION_EXTENSION: &str = "jsonl";

/// Length of a hyphenated UUID string.
const HYPHENATED_UUID_LEN: usize = 36;

/// Identifier of a stream: either a session UUID or [`HISTORY_STREAM_ID`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// The discovery stream identifier.
    #[must_use]
    pub fn history() -> Self {
        Self(HISTORY_STREAM_ID.to_string())
    }

    /// Parse a session identifier.
    ///
    /// Only the hyphenated UUID form is accepted, so the identifier always
    /// matches the file stem it was derived from byte for byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use claude_streams::StreamId;
    ///
    /// assert!(StreamId::parse_session("a1b2c3d4-e5f6-4789-abcd-0123456789ab").is_some());
    /// assert!(StreamId::parse_session("not-a-session").is_none());
    /// ```
    #[must_use]
    pub fn parse_session(s: &str) -> Option<Self> {
        if s.len() != HYPHENATED_UUID_LEN || Uuid::parse_str(s).is_err() {
            return None;
        }
        Some(Self(s.to_string()))
    }

    /// Parse any stream identifier, session or discovery.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s == HISTORY_STREAM_ID {
            Some(Self::history())
        } else {
            Self::parse_session(s)
        }
    }

    /// Derive a session identifier from a log file path.
    ///
    /// Returns `None` unless the file is named `<uuid>.jsonl`.
    #[must_use]
    pub fn from_session_path(path: &Path) -> Option<Self> {
        if !path.extension().is_some_and(|ext| ext == SESSION_EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        Self::parse_session(stem)
    }

    /// File name of the session log backing this stream.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{SESSION_EXTENSION}", self.0)
    }

    /// Whether this is the discovery stream.
    #[must_use]
    pub fn is_history(&self) -> bool {
        self.0 == HISTORY_STREAM_ID
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
