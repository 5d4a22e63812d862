//! Filesystem watch handle bridging notify into tokio.
//!
//! Watches are registered per directory (non-recursively) as the
//! orchestrator's walk visits them; the watch set only grows. Events
//! and watch errors are forwarded over one unbounded channel that the
//! event loop drains.

use std::path::Path;
use std::sync::Mutex;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

/// Type of filesystem event, collapsed to what the sync loop acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// File or directory was created.
    Created,
    /// File was written to or otherwise modified.
    Modified,
    /// File or directory was deleted.
    Removed,
    /// Anything else (access, metadata-only, unknown).
    Other,
}

/// A filesystem event delivered to the sync loop.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub paths: Vec<std::path::PathBuf>,
}

impl WatchEvent {
    fn from_notify(event: Event) -> Self {
        let kind = match event.kind {
            EventKind::Create(_) => WatchEventKind::Created,
            // A rename target exists and wants uploading; the rename
            // source no longer does, so it must not look like a write.
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) => WatchEventKind::Other,
            EventKind::Modify(_) => WatchEventKind::Modified,
            EventKind::Remove(_) => WatchEventKind::Removed,
            EventKind::Access(_) | EventKind::Other | EventKind::Any => WatchEventKind::Other,
        };
        Self {
            kind,
            paths: event.paths,
        }
    }
}

/// What arrives on the watch channel.
#[derive(Debug)]
pub enum WatchMessage {
    Event(WatchEvent),
    Error(notify::Error),
}

/// Watch handle owned by the orchestrator. Registration happens from
/// the walk; the handle is closed exactly once by the event loop.
pub struct FsWatcher {
    inner: Mutex<Option<RecommendedWatcher>>,
}

impl FsWatcher {
    /// Create the watcher and the channel its events arrive on.
    pub fn new() -> notify::Result<(Self, mpsc::UnboundedReceiver<WatchMessage>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let msg = match res {
                    Ok(event) => WatchMessage::Event(WatchEvent::from_notify(event)),
                    Err(err) => WatchMessage::Error(err),
                };
                // Send failure means the loop is gone; nothing to do.
                let _ = tx.send(msg);
            },
            notify::Config::default(),
        )?;
        Ok((
            Self {
                inner: Mutex::new(Some(watcher)),
            },
            rx,
        ))
    }

    /// Register a single directory. Children are covered only once
    /// they are visited and registered themselves.
    pub fn watch_dir(&self, path: &Path) -> notify::Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(watcher) => watcher.watch(path, RecursiveMode::NonRecursive),
            None => Err(notify::Error::generic("watch handle already closed")),
        }
    }

    /// Drop the underlying watch handle. Idempotent.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!("closed filesystem watch handle");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}
