//! Sync orchestrator: translates local filesystem state and events
//! into calls against the storage backend.
//!
//! Startup walks the watch root, registering a watch on every
//! directory it visits and optionally fanning the pre-existing files
//! out over a bounded worker pool. After that a single background
//! task drains filesystem events for the lifetime of the server and
//! re-uploads each created or written file in full.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::storage::{CreateOptions, FileStorage};
use crate::sync::error::{Result, SyncError};
use crate::sync::policy::FailurePolicy;
use crate::sync::state::SyncState;
use crate::sync::watcher::{FsWatcher, WatchEvent, WatchEventKind, WatchMessage};

/// Worker pool size used when the caller does not configure one.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Read granularity when streaming a local file into the store.
const READ_CHUNK: usize = 1024 * 1024;

/// Orchestrator construction options.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Directory holding the sidecar state record.
    pub conf_path: PathBuf,
    /// Upload every pre-existing file during the initial scan.
    pub init_upload: bool,
    /// Concurrent uploads during the initial scan; 0 means sequential.
    pub pool_size: usize,
    /// What to do with a failed upload.
    pub failure_policy: FailurePolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            conf_path: PathBuf::from("./conf"),
            init_upload: false,
            pool_size: DEFAULT_POOL_SIZE,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Handle to a running sync orchestrator.
///
/// Lifecycle: created watching, `close` requests shutdown, `closed`
/// waits for the event loop to observe it and release the watch
/// handle. There is no way back to watching.
pub struct SyncServer {
    inner: Arc<Inner>,
    cancel: watch::Sender<bool>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    root: PathBuf,
    options: SyncOptions,
    storage: Arc<dyn FileStorage>,
    watcher: FsWatcher,
    state: Mutex<SyncState>,
}

impl SyncServer {
    /// Build the watcher, load the sidecar state, run the initial
    /// scan of `root` and start the event loop.
    pub async fn new(
        root: impl Into<PathBuf>,
        storage: Arc<dyn FileStorage>,
        options: SyncOptions,
    ) -> Result<Self> {
        let root = root.into();
        // Resolve the root so event paths (always absolute) strip
        // cleanly into remote keys.
        let root = match std::fs::create_dir_all(&root).and_then(|_| root.canonicalize()) {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(path = %root.display(), error = %err, "could not resolve watch root");
                root
            }
        };

        let (watcher, events) = FsWatcher::new()?;
        let state = SyncState::load(&options.conf_path)?;

        let inner = Arc::new(Inner {
            root: root.clone(),
            options,
            storage,
            watcher,
            state: Mutex::new(state),
        });

        // Scan failures at startup are logged, not fatal: the server
        // still watches whatever was registered.
        if let Err(err) = inner.add_path(&root).await {
            error!(path = %root.display(), error = %err, "initial scan failed");
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(event_loop(Arc::clone(&inner), events, cancel_rx));

        Ok(Self {
            inner,
            cancel,
            loop_task: Mutex::new(Some(task)),
        })
    }

    /// Extend the watch set with another tree. Re-entrant; there is no
    /// corresponding unwatch.
    pub async fn add_path(&self, path: &Path) -> Result<()> {
        self.inner.add_path(path).await
    }

    /// Whether the initial bulk scan has completed for this root.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock_state().file_initialized
    }

    /// Request shutdown. In-flight uploads are not awaited.
    pub fn close(&self) {
        let _ = self.cancel.send(true);
    }

    /// Wait for the event loop to exit and the watch handle to be
    /// released.
    pub async fn closed(&self) {
        let task = self
            .loop_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!(error = %err, "event loop task aborted");
            }
        }
    }
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Walk `path`, watching every directory and uploading every file
    /// when the initial bulk upload is due. Blocks until every
    /// dispatched upload has finished.
    async fn add_path(self: &Arc<Self>, path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|source| SyncError::InvalidRoot {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let bulk_upload = {
            let state = self.lock_state();
            self.options.init_upload && !state.file_initialized
        };
        if self.options.init_upload && !bulk_upload {
            info!(path = %path.display(), "already initialized, skipping bulk upload");
        }

        let pool = (self.options.pool_size > 0)
            .then(|| Arc::new(Semaphore::new(self.options.pool_size)));
        let mut jobs: JoinSet<()> = JoinSet::new();

        for entry in WalkDir::new(path) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "walk error");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                // Lazily registered: files created in a subdirectory
                // before the walk reaches it are missed.
                if let Err(err) = self.watcher.watch_dir(entry.path()) {
                    warn!(path = %entry.path().display(), error = %err, "failed to watch directory");
                }
                continue;
            }
            if !bulk_upload {
                continue;
            }
            match &pool {
                Some(pool) => match Arc::clone(pool).acquire_owned().await {
                    Ok(permit) => {
                        let inner = Arc::clone(self);
                        let file = entry.into_path();
                        jobs.spawn(async move {
                            let _permit = permit;
                            inner.sync_path(&file).await;
                        });
                    }
                    // Pool unavailable: degrade to fully sequential.
                    Err(_) => self.sync_path(entry.path()).await,
                },
                None => self.sync_path(entry.path()).await,
            }
        }

        // Barrier: the scan counts as complete only once every
        // dispatched upload is.
        while jobs.join_next().await.is_some() {}

        if bulk_upload {
            let state = {
                let mut state = self.lock_state();
                state.file_initialized = true;
                state.clone()
            };
            if let Err(err) = state.store(&self.options.conf_path) {
                warn!(error = %err, "failed to persist sync state");
            }
        }
        Ok(())
    }

    /// Upload one path under the configured failure policy.
    async fn sync_path(&self, path: &Path) {
        self.options
            .failure_policy
            .run(path, || self.upload_file(path))
            .await;
    }

    /// Read the file in full and stream it into the store under its
    /// mirrored key. Directories are skipped.
    async fn upload_file(&self, path: &Path) -> anyhow::Result<()> {
        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let meta = file
            .metadata()
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if meta.is_dir() {
            debug!(path = %path.display(), "is a directory, skipping upload");
            return Ok(());
        }

        let key = remote_key(&self.root, path);
        let mut sink = self.storage.create(&key, CreateOptions::default()).await?;
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            if n == 0 {
                break;
            }
            sink.write(&buf[..n]).await?;
        }
        sink.close().await?;
        info!(path = %path.display(), key = %key, size = meta.len(), "uploaded");
        Ok(())
    }

    async fn handle_event(&self, event: WatchEvent) {
        match event.kind {
            WatchEventKind::Created | WatchEventKind::Modified => {
                for path in &event.paths {
                    debug!(path = %path.display(), kind = ?event.kind, "filesystem event");
                    self.sync_path(path).await;
                }
            }
            WatchEventKind::Removed => {
                // Deletions are not mirrored; the remote copy stays.
                for path in &event.paths {
                    info!(path = %path.display(), "removed locally, remote object kept");
                }
            }
            WatchEventKind::Other => {}
        }
    }
}

/// Remote keys mirror the path relative to the watch root and always
/// begin with a separator.
fn remote_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    format!("/{}", rel.to_string_lossy().trim_start_matches('/'))
}

/// Long-lived task draining filesystem events until cancellation.
/// Uploads run synchronously inside this task, so a stalled upload
/// delays later events; only the initial scan fans out.
async fn event_loop(
    inner: Arc<Inner>,
    mut events: mpsc::UnboundedReceiver<WatchMessage>,
    mut cancel: watch::Receiver<bool>,
) {
    info!("starting watch loop");
    loop {
        tokio::select! {
            msg = events.recv() => match msg {
                Some(WatchMessage::Event(event)) => inner.handle_event(event).await,
                Some(WatchMessage::Error(err)) => error!(error = %err, "watch error"),
                None => {
                    warn!("watch channel closed");
                    break;
                }
            },
            _ = cancel.changed() => {
                warn!("watch loop cancelled");
                break;
            }
        }
    }
    inner.watcher.close();
}
