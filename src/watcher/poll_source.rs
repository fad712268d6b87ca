//! Polling fallback for platforms or filesystems without notifications.
//!
//! Rescans the directory on a fixed interval and diffs file sizes,
//! modification times and identities against the previous scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use file_id::FileId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::WatcherError;
use super::scan::scan_sessions;
use super::source::{EventSource, Subscription, WatcherEvent};

/// Event source that periodically rescans the directory.
#[derive(Debug, Clone)]
pub struct PollSource {
    interval: Duration,
}

impl PollSource {
    /// Create a source that rescans every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

/// What a scan remembers about one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: SystemTime,
    identity: Option<FileId>,
}

type Snapshot = BTreeMap<PathBuf, FileStamp>;

fn snapshot(dir: &Path) -> Result<Snapshot, WatcherError> {
    Ok(scan_sessions(dir)?
        .into_iter()
        .map(|file| {
            (
                file.path,
                FileStamp {
                    len: file.len,
                    modified: file.modified,
                    identity: file.identity,
                },
            )
        })
        .collect())
}

/// Events that turn `previous` into `current`.
fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<WatcherEvent> {
    let mut events = Vec::new();

    for (path, stamp) in current {
        match previous.get(path) {
            None => events.push(WatcherEvent::Created(path.clone())),
            Some(old) if old != stamp => events.push(WatcherEvent::Modified(path.clone())),
            Some(_) => {}
        }
    }

    for path in previous.keys() {
        if !current.contains_key(path) {
            events.push(WatcherEvent::Removed(path.clone()));
        }
    }

    events
}

impl EventSource for PollSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn subscribe(&self, dir: &Path) -> Result<Subscription, WatcherError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatcherError::NoRuntime)?;
        let known = snapshot(dir)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        runtime.spawn(poll_loop(
            dir.to_path_buf(),
            self.interval,
            known,
            event_tx,
            cancel.clone(),
        ));

        Ok(Subscription::new(self.name(), event_rx, move || {
            cancel.cancel();
        }))
    }
}

async fn poll_loop(
    dir: PathBuf,
    interval: Duration,
    mut known: Snapshot,
    event_tx: mpsc::UnboundedSender<Vec<WatcherEvent>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let scan_dir = dir.clone();
        let batch = match tokio::task::spawn_blocking(move || snapshot(&scan_dir)).await {
            Ok(Ok(current)) => {
                let batch = diff(&known, &current);
                known = current;
                batch
            }
            Ok(Err(e)) => vec![WatcherEvent::Error(e)],
            Err(e) => vec![WatcherEvent::Error(WatcherError::Io(std::io::Error::other(e)))],
        };

        if !batch.is_empty() && event_tx.send(batch).is_err() {
            break;
        }
    }

    tracing::debug!(path = %dir.display(), "Poll watcher stopped");
}
