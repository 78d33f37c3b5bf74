//! Package directory watcher.
//!
//! Edits made to `<packages-dir>/*.conf` outside of `save_package` trigger
//! the same fan-out a save would, so generated configs never drift from the
//! package files on disk.
//!
//! Refreshes fire on the trailing edge: every event pushes the package's
//! deadline out by [`DEBOUNCE_WINDOW`], and the fan-out runs once the file
//! has been quiet that long. An edit that lands in several writes is only
//! ever applied in its final state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};

use userredis_core::PackageName;
use userredis_provision::{AdminToken, Provisioner};

use crate::error::{io_err, DaemonError};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

const PACKAGE_EXTENSION: &str = "conf";

/// A registered notify watch on the packages directory.
///
/// Created before the daemon starts serving so no edit made after the socket
/// appears can be missed.
pub(crate) struct PackageWatcher {
    dir: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl PackageWatcher {
    pub(crate) fn start(dir: &Path) -> Result<Self, DaemonError> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let dir = fs::canonicalize(dir).map_err(|e| io_err(dir, e))?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %dir.display(), "watching packages directory");

        Ok(Self {
            dir,
            events,
            _watcher: watcher,
        })
    }

    pub(crate) async fn run(
        mut self,
        provisioner: Arc<Provisioner>,
        token: Arc<AdminToken>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        let mut pending = PendingRefreshes::new(DEBOUNCE_WINDOW);

        loop {
            let wake = pending.next_deadline();
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    for name in pending.take_due(Instant::now()) {
                        refresh(provisioner.clone(), token.clone(), name).await;
                    }
                }
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Ok(event) if is_relevant_event_kind(&event.kind) => {
                            let now = Instant::now();
                            for path in &event.paths {
                                if let Some(name) = package_for_path(path, &self.dir) {
                                    pending.record(name, now);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "watcher event error"),
                    }
                }
            }
        }

        if !pending.is_empty() {
            tracing::debug!(pending = pending.len(), "dropping pending package refreshes on shutdown");
        }
        Ok(())
    }
}

/// Packages waiting for their directory events to settle.
#[derive(Debug)]
struct PendingRefreshes {
    window: Duration,
    deadlines: HashMap<PackageName, Instant>,
}

impl PendingRefreshes {
    fn new(window: Duration) -> Self {
        Self {
            window,
            deadlines: HashMap::new(),
        }
    }

    /// Note an event for `name` at `now`, restarting its quiet period.
    fn record(&mut self, name: PackageName, now: Instant) {
        self.deadlines.insert(name, now + self.window);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every package whose quiet period has elapsed.
    fn take_due(&mut self, now: Instant) -> Vec<PackageName> {
        let mut due: Vec<PackageName> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();
        due.sort();
        for name in &due {
            self.deadlines.remove(name);
        }
        due
    }

    fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    fn len(&self) -> usize {
        self.deadlines.len()
    }
}

async fn refresh(provisioner: Arc<Provisioner>, token: Arc<AdminToken>, name: PackageName) {
    let label = name.to_string();
    let result =
        tokio::task::spawn_blocking(move || provisioner.refresh_package_users(&token, &name)).await;
    match result {
        Ok(Ok(report)) => tracing::info!(
            package = %label,
            regenerated = report.regenerated.len(),
            failed = report.failed.len(),
            "package change applied",
        ),
        Ok(Err(err)) => tracing::error!(package = %label, error = %err, "package refresh failed"),
        Err(err) => tracing::error!(package = %label, error = %err, "package refresh task panicked"),
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// The package a changed path belongs to, if it is a `<name>.conf` directly in
/// `packages` whose stem is already a clean package name.
fn package_for_path(path: &Path, packages: &Path) -> Option<PackageName> {
    if path.parent() != Some(packages) {
        return None;
    }
    let is_conf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == PACKAGE_EXTENSION)
        .unwrap_or(false);
    if !is_conf {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    PackageName::sanitize(stem)
        .ok()
        .filter(|name| name.as_str() == stem)
}
