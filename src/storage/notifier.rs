//! Tail notification for parked readers.
//!
//! Each stream owns one `watch` channel carrying its [`LedgerEntry`]. Every
//! parked reader holds a receiver; a ledger change wakes all of them at
//! once and each decides for itself whether the change concerns it.
//! Dropping a receiver (wake, timeout, or disconnect) removes the waiter.

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ledger::{Advance, LedgerEntry, StreamStatus};

/// Result of a parked wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The ledger moved past the waiter's offset or changed generation/status.
    Changed(LedgerEntry),
    /// The deadline elapsed first.
    TimedOut,
    /// The caller or the storage gave up.
    Cancelled,
}

/// Wake mechanism and ledger holder for one stream.
#[derive(Debug)]
pub struct TailNotifier {
    tx: watch::Sender<LedgerEntry>,
}

impl TailNotifier {
    #[must_use]
    pub fn new(entry: LedgerEntry) -> Self {
        let (tx, _) = watch::channel(entry);
        Self { tx }
    }

    /// Current ledger snapshot.
    #[must_use]
    pub fn current(&self) -> LedgerEntry {
        *self.tx.borrow()
    }

    /// Apply a ledger update, waking waiters only if something changed.
    ///
    /// Updates are serialized by the channel's lock, so all readers observe
    /// the same order of changes.
    pub fn update(&self, apply: impl FnOnce(&mut LedgerEntry) -> Advance) -> Advance {
        let mut advance = Advance::Unchanged;
        self.tx.send_if_modified(|entry| {
            advance = apply(entry);
            advance.is_change()
        });
        advance
    }

    /// Number of readers currently parked on this stream.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Park until the stream moves past `offset` in `generation`.
    ///
    /// Wakes on growth beyond `offset`, on any generation change, or when
    /// the file is removed. Returns `TimedOut` at `deadline` and
    /// `Cancelled` when either token fires.
    pub async fn wait_past(
        &self,
        offset: u64,
        generation: u64,
        deadline: Instant,
        cancel: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> WaitOutcome {
        let mut rx = self.tx.subscribe();

        tokio::select! {
            biased;
            () = cancel.cancelled() => WaitOutcome::Cancelled,
            () = shutdown.cancelled() => WaitOutcome::Cancelled,
            changed = rx.wait_for(|entry| {
                entry.size > offset
                    || entry.generation != generation
                    || entry.status == StreamStatus::Gone
            }) => match changed {
                Ok(entry) => WaitOutcome::Changed(*entry),
                Err(_) => WaitOutcome::Cancelled,
            },
            () = tokio::time::sleep_until(deadline) => WaitOutcome::TimedOut,
        }
    }
}
