//! Filesystem event source abstraction.
//!
//! An [`EventSource`] turns a directory into a stream of event batches.
//! Native notifications and polling both implement it, so the storage
//! logic consuming the events does not depend on the platform backend.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use super::error::WatcherError;

/// Events emitted for the watched directory.
#[derive(Debug)]
pub enum WatcherEvent {
    /// A session file appeared.
    Created(PathBuf),
    /// A session file was written to.
    Modified(PathBuf),
    /// A session file was removed.
    Removed(PathBuf),
    /// The underlying observer reported an error.
    Error(WatcherError),
}

impl WatcherEvent {
    /// The file path this event refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Created(path) | Self::Modified(path) | Self::Removed(path) => Some(path),
            Self::Error(_) => None,
        }
    }
}

/// A capability that can observe a directory.
pub trait EventSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Start observing `dir` (non-recursive).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be observed.
    fn subscribe(&self, dir: &Path) -> Result<Subscription, WatcherError>;
}

/// A live subscription to directory events.
///
/// Events arrive in batches; one batch corresponds to one debounce window
/// or one poll. Dropping the subscription stops the observer.
pub struct Subscription {
    source: &'static str,
    events: mpsc::UnboundedReceiver<Vec<WatcherEvent>>,
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(
        source: &'static str,
        events: mpsc::UnboundedReceiver<Vec<WatcherEvent>>,
        stop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            source,
            events,
            stop: Some(Box::new(stop)),
        }
    }

    /// Name of the source that produced this subscription.
    #[must_use]
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Wait for the next batch of events.
    ///
    /// Returns `None` once the observer has stopped.
    pub async fn recv(&mut self) -> Option<Vec<WatcherEvent>> {
        self.events.recv().await
    }

    /// Stop observing.
    pub fn close(mut self) {
        self.stop_observer();
    }

    fn stop_observer(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop_observer();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_event_path() {
        let created = WatcherEvent::Created(PathBuf::from("/tmp/a.jsonl"));
        assert_eq!(created.path(), Some(Path::new("/tmp/a.jsonl")));

        let removed = WatcherEvent::Removed(PathBuf::from("/tmp/b.jsonl"));
        assert_eq!(removed.path(), Some(Path::new("/tmp/b.jsonl")));

        let error = WatcherEvent::Error(WatcherError::ChannelClosed);
        assert!(error.path().is_none());
    }

    #[test]
    fn test_stop_runs_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = stops.clone();
        let subscription = Subscription::new("test", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(subscription.source(), "test");
        subscription.close();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_observer() {
        let stops = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = stops.clone();
        let subscription = Subscription::new("test", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(subscription);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recv_ends_when_sender_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("test", rx, || {});

        tx.send(vec![WatcherEvent::Modified(PathBuf::from("/tmp/a.jsonl"))])
            .unwrap();
        drop(tx);

        let batch = subscription.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(subscription.recv().await.is_none());
    }
}
