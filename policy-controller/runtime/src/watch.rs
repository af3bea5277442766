//! Reloads the policy configuration when its file changes.
//!
//! The file's parent directory is watched so that replacing the file by
//! renaming another over it is observed. Bursts of events are coalesced: a
//! reload happens only once no event for the file has arrived for the
//! debounce delay.

use crate::{
    core::PolicyStore,
    metrics::{ReloadMetrics, ReloadResult},
};
use futures::prelude::*;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};
use tokio::{sync::mpsc, time};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub const DEFAULT_DEBOUNCE: time::Duration = time::Duration::from_millis(200);
pub const DEFAULT_WATCH_RETRY: time::Duration = time::Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    file_name: Option<OsString>,
    store: PolicyStore,
    debounce: time::Duration,
    watch_retry: time::Duration,
    metrics: ReloadMetrics,
}

// === impl ConfigWatcher ===

impl ConfigWatcher {
    pub fn new(
        path: impl Into<PathBuf>,
        store: PolicyStore,
        debounce: time::Duration,
        metrics: ReloadMetrics,
    ) -> Self {
        let path = path.into();
        Self {
            file_name: path.file_name().map(Into::into),
            path,
            store,
            debounce,
            watch_retry: DEFAULT_WATCH_RETRY,
            metrics,
        }
    }

    /// Sets how long to wait before retrying a watch that could not be
    /// established.
    pub fn with_watch_retry(mut self, retry: time::Duration) -> Self {
        self.watch_retry = retry;
        self
    }

    /// Starts watching the configuration file in a background task.
    ///
    /// If the watch cannot be established the error is logged, the store
    /// keeps serving its current configuration, and the watch is retried.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let span = info_span!("config", path = %self.path.display());
        tokio::spawn(
            async move {
                let (tx, rx) = mpsc::unbounded_channel();
                // The watch stops when the watcher is dropped.
                let _watcher = self.establish(tx).await;
                self.run(UnboundedReceiverStream::new(rx)).await
            }
            .instrument(span),
        )
    }

    async fn establish(
        &self,
        tx: mpsc::UnboundedSender<notify::Result<Event>>,
    ) -> RecommendedWatcher {
        let mut failed = false;
        loop {
            match self.watch_dir(tx.clone()) {
                Ok(watcher) => {
                    // Changes made while the watch was down were not observed.
                    if failed {
                        self.reload().await;
                    }
                    return watcher;
                }
                Err(error) => {
                    error!(%error, retry = ?self.watch_retry, "Failed to watch configuration");
                    self.metrics.watch_error();
                    failed = true;
                    time::sleep(self.watch_retry).await;
                }
            }
        }
    }

    fn watch_dir(
        &self,
        tx: mpsc::UnboundedSender<notify::Result<Event>>,
    ) -> notify::Result<RecommendedWatcher> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver is only dropped on shutdown.
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "Watching configuration directory");
        Ok(watcher)
    }

    /// Processes file events until the stream ends, reloading the store at
    /// most once per quiet period.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = notify::Result<Event>>,
    {
        tokio::pin!(events);

        loop {
            // Wait for the first event of a burst.
            loop {
                match events.next().await {
                    None => return,
                    Some(res) if self.is_relevant(&res) => break,
                    Some(_) => {}
                }
            }

            let deadline = time::sleep(self.debounce);
            tokio::pin!(deadline);
            let mut closed = false;
            loop {
                tokio::select! {
                    res = events.next() => match res {
                        Some(res) => {
                            if self.is_relevant(&res) {
                                deadline.as_mut().reset(time::Instant::now() + self.debounce);
                            }
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                    () = &mut deadline => break,
                }
            }

            self.reload().await;
            if closed {
                return;
            }
        }
    }

    fn is_relevant(&self, res: &notify::Result<Event>) -> bool {
        let event = match res {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "Configuration watch failed");
                self.metrics.watch_error();
                return false;
            }
        };

        if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
            return false;
        }

        let relevant = event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == self.file_name.as_deref());
        if relevant {
            debug!(kind = ?event.kind, "Configuration file changed");
        }
        relevant
    }

    async fn reload(&self) {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) => {
                error!(%error, "Failed to read configuration; keeping current configuration");
                self.metrics.reloaded(ReloadResult::Failed);
                return;
            }
        };

        match self.store.reload(&raw) {
            Ok(true) => {
                info!(fingerprint = ?self.store.fingerprint(), "Configuration reloaded");
                self.metrics.reloaded(ReloadResult::Applied);
            }
            Ok(false) => {
                debug!("Configuration unchanged");
                self.metrics.reloaded(ReloadResult::Unchanged);
            }
            Err(error) => {
                error!(%error, "Invalid configuration; keeping current configuration");
                self.metrics.reloaded(ReloadResult::Failed);
            }
        }
    }
}
