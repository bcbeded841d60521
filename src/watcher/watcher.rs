//! Watcher instance and its worker thread.

#![allow(clippy::module_inception)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use super::events::Event;
use super::record::RecordReader;
use super::stats::{WatcherStats, WatcherStatsSnapshot};
use super::sys::{Inotify, Notifier};
use super::table::WatchTable;
use crate::error::WatcherError;
use crate::observability::spans;
use crate::Result;

/// Default bound of the event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 5;

/// Outcome of the initial walk: directories watched, or the error that
/// stopped it.
pub type InitialWalk = std::result::Result<usize, WatcherError>;

/// Recursive watcher over one directory tree.
///
/// Owns its notifier, watch table and read buffer outright; nothing is
/// shared with other instances.
pub struct DirWatcher<N: Notifier = Inotify> {
    pub(super) notifier: N,
    pub(super) table: WatchTable,
    pub(super) reader: RecordReader,
    pub(super) tx: mpsc::Sender<Event>,
    pub(super) stats: Arc<WatcherStats>,
}

impl DirWatcher<Inotify> {
    /// Open a kernel-backed watcher that delivers events on `tx`.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Init` if inotify cannot be initialised.
    pub fn open(tx: mpsc::Sender<Event>) -> std::result::Result<Self, WatcherError> {
        let notifier = Inotify::init().map_err(WatcherError::Init)?;
        Ok(Self::new(notifier, tx))
    }
}

impl<N: Notifier> DirWatcher<N> {
    /// Create a watcher over an already-open notifier.
    pub fn new(notifier: N, tx: mpsc::Sender<Event>) -> Self {
        Self {
            notifier,
            table: WatchTable::new(),
            reader: RecordReader::new(),
            tx,
            stats: WatcherStats::new(),
        }
    }

    /// Current watch table.
    #[must_use]
    pub const fn table(&self) -> &WatchTable {
        &self.table
    }

    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    #[cfg(test)]
    pub(crate) fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// Shared counters, readable while the worker runs.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver an event, waiting for room in the channel.
    pub(super) fn send(&self, event: Event) -> std::result::Result<(), WatcherError> {
        let synthesized = event.is_synthesized();
        self.tx
            .blocking_send(event)
            .map_err(|_| WatcherError::ChannelClosed)?;
        self.stats.event_sent(synthesized);
        Ok(())
    }

    /// Read one record, blocking if necessary, and reconcile it.
    ///
    /// # Errors
    ///
    /// Returns any fatal `WatcherError`.
    pub fn step(&mut self) -> std::result::Result<(), WatcherError> {
        let (wd, event) = self
            .reader
            .read_one(&mut self.notifier, &self.table, &self.stats)?;
        tracing::trace!(
            wd = %wd,
            dir = %event.dir.display(),
            mask = %event.mask,
            cookie = event.cookie,
            name = ?event.name,
            "Read record"
        );
        self.reconcile(wd, event)
    }

    /// Watch `root` and process notifications until a fatal error.
    ///
    /// The outcome of the initial walk is sent on `ready` when given. A
    /// failed walk handed over that way is not returned again.
    ///
    /// On return every watch has been released, the notifier closed and the
    /// event channel closed, in that order. A dropped receiver counts as a
    /// clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that stopped the loop.
    pub fn run(
        mut self,
        root: &Path,
        emit_initial: bool,
        ready: Option<oneshot::Sender<InitialWalk>>,
    ) -> std::result::Result<(), WatcherError> {
        let outcome = self.watch_until_stopped(root, emit_initial, ready);
        self.shutdown();

        match outcome {
            Ok(()) => Ok(()),
            Err(WatcherError::ChannelClosed) => {
                tracing::info!("Event receiver dropped, watcher stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, fatal = e.is_fatal(), "Watcher stopped");
                Err(e)
            }
        }
    }

    fn watch_until_stopped(
        &mut self,
        root: &Path,
        emit_initial: bool,
        ready: Option<oneshot::Sender<InitialWalk>>,
    ) -> std::result::Result<(), WatcherError> {
        let installed = match self.install_tree(root, emit_initial) {
            Ok(installed) => installed,
            Err(e) => return report_walk_failure(ready, e),
        };
        tracing::info!(path = %root.display(), watches = installed, "Initial watches installed");

        if let Some(ready) = ready {
            if ready.send(Ok(installed)).is_err() {
                tracing::debug!("Nobody waiting for initialization");
            }
        }

        loop {
            self.step()?;
        }
    }

    fn shutdown(mut self) {
        let released = self.table.clear(&mut self.notifier);
        self.stats.watches_removed(released);

        let Self {
            notifier, tx, stats, ..
        } = self;
        drop(notifier);
        drop(tx);

        let snapshot = stats.snapshot();
        tracing::info!(
            released,
            records = snapshot.records_read,
            skipped = snapshot.records_skipped,
            forwarded = snapshot.events_forwarded,
            synthesized = snapshot.events_synthesized,
            "Watcher shut down"
        );
    }
}

/// Hand a failed initial walk to whoever waits on `ready`.
///
/// Returns the error itself when nobody is waiting or the consumer is gone.
fn report_walk_failure(
    ready: Option<oneshot::Sender<InitialWalk>>,
    error: WatcherError,
) -> std::result::Result<(), WatcherError> {
    let Some(ready) = ready else {
        return Err(error);
    };
    if matches!(error, WatcherError::ChannelClosed) {
        return Err(error);
    }

    tracing::error!(error = %error, "Initial walk failed");
    match ready.send(Err(error)) {
        Ok(()) => Ok(()),
        Err(unsent) => unsent.map(|_| ()),
    }
}

impl<N: Notifier + Send + 'static> DirWatcher<N> {
    /// Run the watcher on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn(
        self,
        root: PathBuf,
        emit_initial: bool,
        ready: Option<oneshot::Sender<InitialWalk>>,
    ) -> std::io::Result<JoinHandle<std::result::Result<(), WatcherError>>> {
        std::thread::Builder::new()
            .name("htmldir-watcher".to_string())
            .spawn(move || {
                let span = spans::watcher_span(&root);
                let _guard = span.enter();
                self.run(&root, emit_initial, ready)
            })
    }
}

/// Consumer side of a running watcher.
pub struct WatchHandle {
    events: mpsc::Receiver<Event>,
    worker: JoinHandle<std::result::Result<(), WatcherError>>,
    stats: Arc<WatcherStats>,
    ready: Option<oneshot::Receiver<InitialWalk>>,
}

impl WatchHandle {
    /// Receive the next event.
    ///
    /// Returns `None` once the watcher has stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv), for use outside the runtime.
    pub fn blocking_recv(&mut self) -> Option<Event> {
        self.events.blocking_recv()
    }

    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait until the whole tree under the root is watched.
    ///
    /// Resolves to the number of directories watched. Changes made after
    /// this returns are reported. When the initial tree is announced, its
    /// synthesized events must be received while waiting here, otherwise a
    /// channel smaller than the tree stalls the walk.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the initial walk, or an internal error
    /// if called twice or if the worker stopped without finishing the walk.
    pub async fn initialized(&mut self) -> Result<usize> {
        let ready = self
            .ready
            .take()
            .ok_or_else(|| crate::Error::internal("initialization already awaited"))?;
        match ready.await {
            Ok(walk) => walk.map_err(Into::into),
            Err(_) => Err(crate::Error::internal(
                "watcher stopped before the initial walk finished",
            )),
        }
    }

    /// Close the channel and wait for the worker to finish.
    ///
    /// A worker blocked reading notifications only notices the closed
    /// channel when its next event is ready, so this waits for the next
    /// change under the root unless the worker already stopped.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the worker.
    pub fn join(self) -> Result<()> {
        let Self {
            events,
            worker,
            ready,
            ..
        } = self;
        drop(events);

        let outcome = worker
            .join()
            .map_err(|_| crate::Error::internal("watcher thread panicked"))?;

        // A failed initial walk nobody awaited is reported here.
        if let Some(Ok(Err(e))) = ready.map(|mut ready| ready.try_recv()) {
            return Err(e.into());
        }
        outcome.map_err(Into::into)
    }
}

/// Start watching `root` recursively.
///
/// The inotify instance is opened before this returns, so initialisation
/// failures are reported here. Everything after that, including the initial
/// walk, happens on the worker thread. Await [`WatchHandle::initialized`]
/// before changing the tree; a failing walk closes the channel and is
/// reported there, or by [`WatchHandle::join`] if nobody awaited it.
///
/// # Errors
///
/// Returns an error if inotify cannot be initialised or the worker thread
/// cannot be started.
pub fn watch(root: impl Into<PathBuf>, emit_initial: bool, capacity: usize) -> Result<WatchHandle> {
    let (tx, events) = mpsc::channel(capacity.max(1));
    let watcher = DirWatcher::open(tx)?;
    let stats = watcher.stats();
    let (ready_tx, ready) = oneshot::channel();
    let worker = watcher.spawn(root.into(), emit_initial, Some(ready_tx))?;

    Ok(WatchHandle {
        events,
        worker,
        stats,
        ready: Some(ready),
    })
}
