//! Incremental rebuilds driven by filesystem events.
//!
//! A [`Subscription`] owns a background task that batches events over the
//! scope's debounce window, drops duplicates and anything the last install
//! did not depend on, then runs a partial install. A change to the scope's
//! config file forces a full rebuild instead. Failed installs are reported
//! and the subscription keeps going.
//!
//! The set of tracked files comes from the installer's last successful pass,
//! so subscribe after an initial [`Installer::install`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::installer::{InstallOptions, InstallReport, Installer};
use crate::options::ScopeOptions;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A change to one path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Removed, path)
    }
}

/// Notification sent to subscribers.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A relevant batch arrived and an install is starting.
    BeforeUpdate,
    Updated(InstallReport),
    Failed(Arc<Error>),
}

/// Handle to a running watch loop. Dropping it stops the loop.
pub struct Subscription {
    events: mpsc::Receiver<WatchEvent>,
    sender: mpsc::Sender<FileEvent>,
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl Subscription {
    /// Wait for the next notification. `None` once the loop has stopped.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Feed events by hand, alongside (or instead of) the filesystem.
    pub fn sender(&self) -> mpsc::Sender<FileEvent> {
        self.sender.clone()
    }

    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the scope's root directory (and config file) and rebuild on change.
pub fn subscribe(installer: Installer) -> Result<Subscription> {
    let (tx, rx) = mpsc::channel(100);
    let options = installer.options();
    let output_dir = options.output_dir.clone();

    let notify_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else {
            return;
        };
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return,
        };
        for path in event.paths {
            if path.starts_with(&output_dir) {
                continue;
            }
            // Nothing to do once the subscription is gone.
            let _ = notify_tx.blocking_send(FileEvent::new(kind, path));
        }
    })?;

    watcher.watch(&options.root_dir, RecursiveMode::Recursive)?;
    if let Some(config) = &options.config_path {
        if !config.starts_with(&options.root_dir) {
            watcher.watch(config, RecursiveMode::NonRecursive)?;
        }
    }
    tracing::debug!(root = %options.root_dir.display(), "watching");

    Ok(spawn(installer, tx, rx, Some(watcher)))
}

/// A subscription fed only through [`Subscription::sender`].
pub fn channel(installer: Installer) -> Subscription {
    let (tx, rx) = mpsc::channel(100);
    spawn(installer, tx, rx, None)
}

fn spawn(
    installer: Installer,
    sender: mpsc::Sender<FileEvent>,
    receiver: mpsc::Receiver<FileEvent>,
    watcher: Option<RecommendedWatcher>,
) -> Subscription {
    let (events_tx, events_rx) = mpsc::channel(16);
    let task = tokio::spawn(run(installer, receiver, events_tx));
    Subscription {
        events: events_rx,
        sender,
        task,
        _watcher: watcher,
    }
}

async fn run(
    installer: Installer,
    mut receiver: mpsc::Receiver<FileEvent>,
    events: mpsc::Sender<WatchEvent>,
) {
    let debounce = installer.options().debounce;
    let mut tracked: FxHashSet<PathBuf> = installer.origins().into_iter().collect();

    while let Some(first) = receiver.recv().await {
        let mut batch = IndexSet::new();
        batch.insert(first);

        let window = tokio::time::sleep(debounce);
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => break,
                next = receiver.recv() => match next {
                    Some(event) => {
                        batch.insert(event);
                    }
                    None => break,
                },
            }
        }

        let options = installer.options();
        let relevant: Vec<FileEvent> = batch
            .into_iter()
            .filter(|event| is_relevant(options, &tracked, event))
            .collect();
        if relevant.is_empty() {
            continue;
        }

        let config_changed = relevant
            .iter()
            .any(|event| options.config_path.as_deref() == Some(event.path.as_path()));
        tracing::debug!(events = relevant.len(), config_changed, "rebuilding");
        if events.send(WatchEvent::BeforeUpdate).await.is_err() {
            break;
        }

        let result = if config_changed {
            installer.install(InstallOptions::force()).await
        } else {
            installer.rebuild(&relevant).await
        };
        let event = match result {
            Ok(report) => {
                tracked = installer.origins().into_iter().collect();
                WatchEvent::Updated(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "rebuild failed");
                WatchEvent::Failed(Arc::new(err))
            }
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// Whether an event can affect the last install.
fn is_relevant(options: &ScopeOptions, tracked: &FxHashSet<PathBuf>, event: &FileEvent) -> bool {
    let path = event.path.as_path();
    if options.config_path.as_deref() == Some(path) {
        return true;
    }
    if options.is_output(path) {
        return false;
    }
    if tracked.contains(path) {
        return true;
    }
    event.kind == ChangeKind::Created && is_plausible_member(options, path)
}

/// A new file the resolver could pick up: under the root, with an extension
/// it tries.
fn is_plausible_member(options: &ScopeOptions, path: &Path) -> bool {
    if !path.starts_with(&options.root_dir) {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    options
        .resolve
        .extensions
        .iter()
        .any(|ext| name.ends_with(ext.as_str()))
}
