//! Native filesystem notifications via notify.
//!
//! Debounced events are bridged from notify's callback thread into a tokio
//! channel, one batch per debounce window.

use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{EventKind, ModifyKind},
        RecursiveMode,
    },
    DebounceEventResult, DebouncedEvent,
};
use tokio::sync::mpsc;

use super::error::WatcherError;
use super::source::{EventSource, Subscription, WatcherEvent};
use crate::stream_id::SESSION_EXTENSION;

/// How long the bridge thread waits for events before checking for stop.
const BRIDGE_POLL: Duration = Duration::from_millis(100);

/// Event source backed by the platform's native notification API.
#[derive(Debug, Clone)]
pub struct NotifySource {
    debounce: Duration,
}

impl NotifySource {
    /// Create a source that coalesces events within `debounce`.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self { debounce }
    }
}

impl EventSource for NotifySource {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn subscribe(&self, dir: &Path) -> Result<Subscription, WatcherError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (notify_tx, notify_rx) = std_mpsc::channel();

        let mut debouncer = new_debouncer(self.debounce, None, move |result| {
            let _ = notify_tx.send(result);
        })?;
        debouncer.watch(dir, RecursiveMode::NonRecursive)?;

        let dir = dir.to_path_buf();

        // Bridge thread: converts debounced batches to tokio mpsc
        thread::Builder::new()
            .name("claude-streams-watcher".to_string())
            .spawn(move || {
                loop {
                    if stop_rx.try_recv().is_ok() {
                        break;
                    }

                    match notify_rx.recv_timeout(BRIDGE_POLL) {
                        Ok(result) => {
                            let batch = translate_result(result, &dir);
                            if !batch.is_empty() && event_tx.send(batch).is_err() {
                                break;
                            }
                        }
                        Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                        Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }

                // Keep debouncer alive until thread exits
                drop(debouncer);
                tracing::debug!(path = %dir.display(), "Notify bridge stopped");
            })?;

        Ok(Subscription::new(self.name(), event_rx, move || {
            let _ = stop_tx.send(());
        }))
    }
}

/// Translate one debounce result into a batch of watcher events.
fn translate_result(result: DebounceEventResult, dir: &Path) -> Vec<WatcherEvent> {
    match result {
        Ok(events) => {
            let mut batch = Vec::new();
            for event in &events {
                translate_event(event, dir, &mut batch);
            }
            batch
        }
        Err(errors) => errors
            .into_iter()
            .map(|error| WatcherEvent::Error(WatcherError::Notify(error)))
            .collect(),
    }
}

fn translate_event(event: &DebouncedEvent, dir: &Path, batch: &mut Vec<WatcherEvent>) {
    for path in event.paths.iter().filter(|p| is_candidate(p, dir)) {
        let translated = match event.kind {
            EventKind::Create(_) => WatcherEvent::Created(path.clone()),
            // Renames carry both ends; which end this path is shows on disk
            EventKind::Modify(ModifyKind::Name(_)) => {
                if path.exists() {
                    WatcherEvent::Created(path.clone())
                } else {
                    WatcherEvent::Removed(path.clone())
                }
            }
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
                WatcherEvent::Modified(path.clone())
            }
            EventKind::Remove(_) => WatcherEvent::Removed(path.clone()),
            EventKind::Access(_) => continue,
        };
        batch.push(translated);
    }
}

/// Only direct children of the watched directory with the session extension.
fn is_candidate(path: &Path, dir: &Path) -> bool {
    path.parent() == Some(dir) && path.extension().is_some_and(|ext| ext == SESSION_EXTENSION)
}
