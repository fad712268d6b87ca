//! Watcher module for the session log directory.
//!
//! Provides directory scanning and the filesystem event sources that feed
//! the storage adapter.

mod error;
mod notify_source;
mod poll_source;
mod scan;
mod source;

pub use error::WatcherError;
pub use notify_source::NotifySource;
pub use poll_source::PollSource;
pub use scan::{scan_sessions, SessionFile};
pub use source::{EventSource, Subscription, WatcherEvent};
