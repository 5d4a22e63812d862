//! Sync orchestration: filesystem watching, the initial bulk scan and
//! the event-driven upload loop.

pub mod error;
pub mod policy;
pub mod server;
pub mod state;
pub mod watcher;

pub use error::SyncError;
pub use policy::{DeadLetter, FailurePolicy};
pub use server::{SyncOptions, SyncServer, DEFAULT_POOL_SIZE};
pub use state::SyncState;
pub use watcher::{FsWatcher, WatchEvent, WatchEventKind, WatchMessage};
