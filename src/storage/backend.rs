//! Storage capability interface shared by the object-store and
//! local-filesystem backends. The orchestrator holds only this
//! interface and never knows which variant is behind it.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::storage::error::Result;

/// Readable stream over an object body.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Metadata returned by [`FileStorage::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// The key the object is stored under.
    pub path: String,
    /// Base name of the object, without any directory components.
    pub file_name: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Per-create options. Extensible; only a content-type override today.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub content_type: Option<String>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A write sink bound to one key for its entire lifetime.
///
/// One driving sequence only: `create -> write* -> close`. Sinks do no
/// internal locking and are not safe for concurrent writes.
#[async_trait]
pub trait ObjectSink: Send {
    /// Append bytes to the object. Either all bytes are accepted or
    /// the call fails and none are.
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush any buffered bytes and finalize the object.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Three-operation storage contract consumed by the sync orchestrator.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Open a write sink for `path`, creating the object.
    async fn create(&self, path: &str, opts: CreateOptions) -> Result<Box<dyn ObjectSink>>;

    /// Open a readable stream over the object at `path`.
    async fn get(&self, path: &str) -> Result<ObjectReader>;

    /// Fetch object metadata.
    async fn stat(&self, path: &str) -> Result<FileInfo>;
}

/// Base name of a `/`-separated key.
pub(crate) fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
