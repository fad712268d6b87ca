//! Storage adapter over a directory of session logs.
//!
//! [`Storage`] owns the registry and the single directory watcher. One
//! background task applies watcher events; request tasks call
//! [`Storage::read`] for catch-up reads and [`Storage::wait`] for long-polls.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::StorageError;
use super::ledger::{Advance, LedgerEntry, Position, Readiness};
use super::notifier::WaitOutcome;
use super::reader::{self, FileStat};
use super::registry::{Backing, StreamHandle, StreamRegistry};
use crate::config::StorageConfig;
use crate::stream_id::StreamId;
use crate::watcher::{
    scan_sessions, EventSource, NotifySource, PollSource, Subscription, WatcherError, WatcherEvent,
};

/// Result of a read or long-poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes from the requested offset; empty when nothing is new.
    pub data: Vec<u8>,
    /// Offset to resume from.
    pub next_offset: u64,
    /// Known size of the stream when the read was served.
    pub tail_offset: u64,
    /// Generation the bytes belong to.
    pub generation: u64,
    /// Whether `next_offset` reached the tail.
    pub up_to_date: bool,
    /// Whether a long-poll ended at its deadline without data.
    pub timed_out: bool,
}

impl ReadOutcome {
    fn empty(offset: u64, entry: LedgerEntry) -> Self {
        Self {
            data: Vec::new(),
            next_offset: offset,
            tail_offset: entry.size,
            generation: entry.generation,
            up_to_date: entry.size == offset,
            timed_out: false,
        }
    }

    fn timed_out(offset: u64, entry: LedgerEntry) -> Self {
        Self {
            timed_out: true,
            ..Self::empty(offset, entry)
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug)]
struct Shared {
    dir: PathBuf,
    config: StorageConfig,
    registry: StreamRegistry,
    /// Serializes stat-then-apply so a stale size never overwrites a newer one.
    sync_lock: Mutex<()>,
    shutdown: CancellationToken,
}

/// Session log directory exposed as resumable, live-tailable streams.
#[derive(Debug)]
pub struct Storage {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl Storage {
    /// Open the storage over `dir` using native notifications, falling
    /// back to polling when they are unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or can be neither
    /// watched nor polled.
    pub async fn open(dir: &Path, config: StorageConfig) -> Result<Self, StorageError> {
        let mut sources: Vec<Box<dyn EventSource>> = Vec::new();
        if !config.force_polling {
            sources.push(Box::new(NotifySource::new(config.debounce())));
        }
        sources.push(Box::new(PollSource::new(config.poll_interval())));

        Self::open_with_sources(dir, config, &sources).await
    }

    /// Open the storage, subscribing with the first source that succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist, no source can
    /// observe it, or the initial scan fails.
    pub async fn open_with_sources(
        dir: &Path,
        config: StorageConfig,
        sources: &[Box<dyn EventSource>],
    ) -> Result<Self, StorageError> {
        let dir = match tokio::fs::canonicalize(dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::DirectoryMissing(dir.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if !tokio::fs::metadata(&dir).await?.is_dir() {
            return Err(StorageError::DirectoryMissing(dir));
        }

        // Subscribe before scanning so writes in between are not missed
        let subscription = subscribe_first(&dir, sources)?;
        let source = subscription.source();

        let shared = Arc::new(Shared {
            dir,
            config,
            registry: StreamRegistry::new(),
            sync_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        });
        shared.reconcile().await?;

        tracing::info!(
            path = %shared.dir.display(),
            sessions = shared.registry.len(),
            source,
            "Storage opened"
        );

        let task = tokio::spawn(run_events(shared.clone(), subscription));

        Ok(Self {
            shared,
            task: Some(task),
        })
    }

    /// Stop the watcher and release every parked reader.
    pub async fn close(mut self) {
        self.shared.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Storage event task ended abnormally");
            }
        }
        tracing::info!(path = %self.shared.dir.display(), "Storage closed");
    }

    /// The watched directory (canonicalized).
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.shared.config
    }

    /// Look up a stream.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStream` if the identifier was never observed.
    pub fn resolve(&self, id: &str) -> Result<StreamHandle, StorageError> {
        self.shared.registry.resolve(id)
    }

    /// Session identifiers in discovery order.
    #[must_use]
    pub fn list(&self) -> Vec<StreamId> {
        self.shared.registry.list()
    }

    /// Catch-up read: everything from `position` to the current size.
    ///
    /// Never blocks. At the tail, returns an empty, up-to-date outcome.
    ///
    /// # Errors
    ///
    /// `UnknownStream`, `InvalidOffset`, `StreamReset`, `StreamGone`, or an
    /// I/O error reading the backing file.
    pub async fn read(
        &self,
        id: &str,
        position: impl Into<Position>,
    ) -> Result<ReadOutcome, StorageError> {
        let handle = self.resolve(id)?;
        let position = position.into();

        match handle.entry().classify(handle.id(), position)? {
            Readiness::Behind(entry) => self.shared.read_span(&handle, position.offset, entry).await,
            Readiness::AtTail(entry) => Ok(ReadOutcome::empty(position.offset, entry)),
        }
    }

    /// Long-poll read.
    ///
    /// Behaves like [`Storage::read`] when data is available. At the tail,
    /// parks until new bytes arrive, the configured long-poll timeout
    /// elapses (`timed_out` outcome, same offset), or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Same as [`Storage::read`]; a truncation or removal while parked is
    /// reported as `StreamReset` or `StreamGone`.
    pub async fn wait(
        &self,
        id: &str,
        position: impl Into<Position>,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome, StorageError> {
        let handle = self.resolve(id)?;
        let position = position.into();

        let parked = match handle.entry().classify(handle.id(), position)? {
            Readiness::Behind(entry) => {
                return self.shared.read_span(&handle, position.offset, entry).await;
            }
            Readiness::AtTail(entry) => entry,
        };

        let deadline = Instant::now() + self.shared.config.long_poll_timeout();
        tracing::trace!(stream_id = %handle.id(), offset = position.offset, "Reader parked at tail");

        let outcome = handle
            .notifier()
            .wait_past(
                position.offset,
                parked.generation,
                deadline,
                cancel,
                &self.shared.shutdown,
            )
            .await;

        match outcome {
            WaitOutcome::Changed(entry) => {
                // Any generation change while parked invalidates the offset
                let pinned = Position::new(position.offset).with_generation(parked.generation);
                match entry.classify(handle.id(), pinned)? {
                    Readiness::Behind(entry) => {
                        self.shared.read_span(&handle, position.offset, entry).await
                    }
                    Readiness::AtTail(entry) => Ok(ReadOutcome::empty(position.offset, entry)),
                }
            }
            WaitOutcome::TimedOut => Ok(ReadOutcome::timed_out(position.offset, handle.entry())),
            WaitOutcome::Cancelled => Ok(ReadOutcome::empty(position.offset, handle.entry())),
        }
    }

    /// Re-scan the directory now instead of waiting for the next event.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn reconcile(&self) -> Result<(), StorageError> {
        Ok(self.shared.reconcile().await?)
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    /// Read `[start, min(size, start + max_read_bytes))` of a stream.
    async fn read_span(
        &self,
        handle: &StreamHandle,
        start: u64,
        entry: LedgerEntry,
    ) -> Result<ReadOutcome, StorageError> {
        let end = entry
            .size
            .min(start.saturating_add(self.config.max_read_bytes.max(1)));

        let data = match handle.backing() {
            Backing::Memory(log) => log.read_range(start, end),
            Backing::File(path) => {
                let data = match reader::read_file_range(path, start, end).await {
                    Ok(data) => data,
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof
                        ) =>
                    {
                        return Err(self.stale_read(handle, path, start, entry).await);
                    }
                    Err(e) => return Err(e.into()),
                };
                // A rename-over can leave enough bytes to satisfy the read
                if replaced_since(path, entry).await {
                    return Err(self.stale_read(handle, path, start, entry).await);
                }
                data
            }
        };

        Ok(ReadOutcome {
            data,
            next_offset: end,
            tail_offset: entry.size,
            generation: entry.generation,
            up_to_date: end == entry.size,
            timed_out: false,
        })
    }

    /// The file changed since its ledger entry was recorded: resync and
    /// report the read against the generation it was validated in.
    async fn stale_read(
        &self,
        handle: &StreamHandle,
        path: &Path,
        start: u64,
        entry: LedgerEntry,
    ) -> StorageError {
        self.sync_path(path).await;
        let pinned = Position::new(start).with_generation(entry.generation);
        match handle.entry().classify(handle.id(), pinned) {
            Err(err) => err,
            Ok(_) => handle.entry().reset_error(handle.id()),
        }
    }

    /// Apply one batch of watcher events.
    ///
    /// Every path is re-checked once per batch regardless of how many
    /// events it received; the file's current size and identity decide
    /// what changed.
    async fn apply_batch(&self, batch: Vec<WatcherEvent>) {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        let mut failed = false;

        for event in batch {
            match event {
                WatcherEvent::Error(e) => {
                    tracing::error!(error = %e, "File watcher reported an error; reconciling");
                    failed = true;
                }
                WatcherEvent::Created(path)
                | WatcherEvent::Modified(path)
                | WatcherEvent::Removed(path) => {
                    if seen.insert(path.clone()) {
                        paths.push(path);
                    }
                }
            }
        }

        for path in &paths {
            self.sync_path(path).await;
        }

        if failed {
            self.reconcile_logged().await;
        }
    }

    /// Stat one path and bring its stream up to date.
    async fn sync_path(&self, path: &Path) {
        if path.parent() != Some(self.dir.as_path()) {
            return;
        }
        let Some(id) = StreamId::from_session_path(path) else {
            return;
        };

        let _guard = self.sync_lock.lock().await;
        match reader::stat_file(path).await {
            Ok(Some(stat)) => self.observe_file(id, path.to_path_buf(), stat),
            Ok(None) => {
                if let Ok(handle) = self.registry.resolve(id.as_str()) {
                    log_advance(&handle, handle.mark_gone());
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat session file");
            }
        }
    }

    /// Full directory scan: registers new files, advances sizes, and marks
    /// streams whose files vanished.
    async fn reconcile(&self) -> Result<(), WatcherError> {
        let _guard = self.sync_lock.lock().await;

        let dir = self.dir.clone();
        let files = tokio::task::spawn_blocking(move || scan_sessions(&dir))
            .await
            .map_err(|e| WatcherError::Io(std::io::Error::other(e)))??;

        let present: HashSet<StreamId> = files.iter().map(|file| file.id.clone()).collect();
        for file in files {
            let stat = FileStat {
                len: file.len,
                identity: file.identity,
            };
            self.observe_file(file.id, file.path, stat);
        }

        for handle in self.registry.sessions() {
            if !present.contains(handle.id()) {
                log_advance(&handle, handle.mark_gone());
            }
        }

        Ok(())
    }

    async fn reconcile_logged(&self) {
        if let Err(e) = self.reconcile().await {
            tracing::error!(path = %self.dir.display(), error = %e, "Directory reconcile failed");
        }
    }

    fn observe_file(&self, id: StreamId, path: PathBuf, stat: FileStat) {
        let (handle, created) = self.registry.ensure(id, path, stat);
        if created {
            tracing::info!(stream_id = %handle.id(), size = stat.len, "Discovered session");
        } else {
            log_advance(&handle, handle.observe_file(stat));
        }
    }

    fn fallback_subscription(&self) -> Option<Subscription> {
        match PollSource::new(self.config.poll_interval()).subscribe(&self.dir) {
            Ok(subscription) => {
                tracing::warn!(path = %self.dir.display(), "Polling session directory");
                Some(subscription)
            }
            Err(e) => {
                tracing::error!(path = %self.dir.display(), error = %e, "Polling fallback failed");
                None
            }
        }
    }
}

fn log_advance(handle: &StreamHandle, advance: Advance) {
    match advance {
        Advance::Unchanged => {}
        Advance::Grew { from, to } => {
            tracing::trace!(stream_id = %handle.id(), from, to, "Session grew");
        }
        Advance::Truncated { from, to } => {
            tracing::warn!(
                stream_id = %handle.id(),
                from,
                to,
                generation = handle.generation(),
                "Session file shrank; readers must restart"
            );
        }
        Advance::Removed => {
            tracing::info!(stream_id = %handle.id(), "Session file removed");
        }
        Advance::Restored { size } => {
            tracing::info!(
                stream_id = %handle.id(),
                size,
                generation = handle.generation(),
                "Session file reappeared"
            );
        }
        Advance::Replaced { size } => {
            tracing::warn!(
                stream_id = %handle.id(),
                size,
                generation = handle.generation(),
                "Session file replaced; readers must restart"
            );
        }
    }
}

/// Whether the file at `path` is no longer the one `entry` describes.
async fn replaced_since(path: &Path, entry: LedgerEntry) -> bool {
    let Some(known) = entry.identity else {
        return false;
    };
    match reader::stat_file(path).await {
        Ok(Some(stat)) => stat.identity.is_some_and(|seen| seen != known),
        Ok(None) => true,
        Err(_) => false,
    }
}

fn subscribe_first(
    dir: &Path,
    sources: &[Box<dyn EventSource>],
) -> Result<Subscription, WatcherError> {
    let mut last_error = None;
    for source in sources {
        match source.subscribe(dir) {
            Ok(subscription) => return Ok(subscription),
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "Event source unavailable");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or(WatcherError::ChannelClosed))
}

async fn next_batch(subscription: &mut Option<Subscription>) -> Option<Vec<WatcherEvent>> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Background task: applies watcher batches and periodic reconciles.
async fn run_events(shared: Arc<Shared>, subscription: Subscription) {
    let mut subscription = Some(subscription);
    let mut rescan = tokio::time::interval(shared.config.rescan_interval());
    rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    rescan.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            batch = next_batch(&mut subscription) => {
                if let Some(batch) = batch {
                    shared.apply_batch(batch).await;
                } else {
                    tracing::error!(
                        error = %WatcherError::ChannelClosed,
                        "File watcher stopped delivering events"
                    );
                    subscription = shared.fallback_subscription();
                    shared.reconcile_logged().await;
                }
            }
            _ = rescan.tick() => {
                if subscription.is_none() {
                    subscription = shared.fallback_subscription();
                }
                shared.reconcile_logged().await;
            }
        }
    }

    if let Some(subscription) = subscription {
        subscription.close();
    }
    tracing::debug!(path = %shared.dir.display(), "Storage event loop stopped");
}
