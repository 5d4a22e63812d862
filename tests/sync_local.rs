// End-to-end orchestrator tests over the local-filesystem backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ossync::storage::{CreateOptions, FileInfo, FileStorage, ObjectReader, ObjectSink, StorageError};
use ossync::sync::{FailurePolicy, SyncOptions, SyncServer, SyncState};

fn options(conf_dir: &Path, init_upload: bool) -> SyncOptions {
    SyncOptions {
        conf_path: conf_dir.to_path_buf(),
        init_upload,
        pool_size: 4,
        failure_policy: FailurePolicy::default(),
    }
}

/// Poll until the mirrored file matches `expected` or the deadline
/// passes. Event delivery is asynchronous, so tests wait rather than
/// assert immediately.
async fn wait_for_mirror(path: &Path, expected: &[u8], deadline: Duration) -> bool {
    let tries = (deadline.as_millis() / 100).max(1);
    for _ in 0..tries {
        if let Ok(found) = std::fs::read(path) {
            if found == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn initial_scan_mirrors_preexisting_files() {
    let root = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();

    let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 249) as u8).collect();
    std::fs::write(root.path().join("a.txt"), b"alpha").unwrap();
    std::fs::create_dir_all(root.path().join("sub/deep")).unwrap();
    std::fs::write(root.path().join("sub/big.bin"), &payload).unwrap();
    std::fs::write(root.path().join("sub/deep/empty"), b"").unwrap();

    let storage = Arc::new(ossync::storage::LocalStorage::new(dest.path()).unwrap());
    let server = SyncServer::new(root.path(), storage, options(conf.path(), true))
        .await
        .unwrap();

    // new() blocks on the scan barrier, so the mirror is already complete.
    assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(dest.path().join("sub/big.bin")).unwrap(), payload);
    assert_eq!(std::fs::read(dest.path().join("sub/deep/empty")).unwrap(), b"");

    assert!(server.is_initialized());
    assert!(SyncState::load(conf.path()).unwrap().file_initialized);

    server.close();
    server.closed().await;
}

#[tokio::test]
async fn bulk_upload_skipped_when_already_initialized() {
    let root = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("seen.txt"), b"contents").unwrap();
    SyncState {
        file_initialized: true,
    }
    .store(conf.path())
    .unwrap();

    let storage = Arc::new(ossync::storage::LocalStorage::new(dest.path()).unwrap());
    let server = SyncServer::new(root.path(), storage, options(conf.path(), true))
        .await
        .unwrap();

    assert!(!dest.path().join("seen.txt").exists());

    server.close();
    server.closed().await;
}

#[tokio::test]
async fn write_event_triggers_full_reupload() {
    let root = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();

    let storage = Arc::new(ossync::storage::LocalStorage::new(dest.path()).unwrap());
    let server = SyncServer::new(root.path(), storage, options(conf.path(), false))
        .await
        .unwrap();

    let local = root.path().join("live.txt");
    let mirrored = dest.path().join("live.txt");

    std::fs::write(&local, b"first contents").unwrap();
    assert!(
        wait_for_mirror(&mirrored, b"first contents", Duration::from_secs(10)).await,
        "created file was not mirrored"
    );

    std::fs::write(&local, b"second, longer contents").unwrap();
    assert!(
        wait_for_mirror(&mirrored, b"second, longer contents", Duration::from_secs(10)).await,
        "modified file was not re-uploaded"
    );

    server.close();
    server.closed().await;
}

#[tokio::test]
async fn remove_event_keeps_the_remote_object() {
    let root = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("keep.txt"), b"kept").unwrap();

    let storage = Arc::new(ossync::storage::LocalStorage::new(dest.path()).unwrap());
    let server = SyncServer::new(root.path(), storage, options(conf.path(), true))
        .await
        .unwrap();

    let mirrored = dest.path().join("keep.txt");
    assert_eq!(std::fs::read(&mirrored).unwrap(), b"kept");

    std::fs::remove_file(root.path().join("keep.txt")).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(std::fs::read(&mirrored).unwrap(), b"kept");

    server.close();
    server.closed().await;
}

#[tokio::test]
async fn close_is_idempotent_and_survives_further_calls() {
    let root = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();
    for i in 0..20 {
        std::fs::write(root.path().join(format!("f{i}")), vec![i as u8; 128]).unwrap();
    }

    let storage = Arc::new(ossync::storage::LocalStorage::new(dest.path()).unwrap());
    let server = SyncServer::new(root.path(), storage, options(conf.path(), true))
        .await
        .unwrap();

    server.close();
    server.close();
    server.closed().await;
    server.closed().await;

    // The watch handle is gone; extending the watch set only logs.
    server.add_path(root.path()).await.unwrap();
}

/// Backend whose create always fails, for exercising the failure path.
struct FailingStorage;

#[async_trait::async_trait]
impl FileStorage for FailingStorage {
    async fn create(
        &self,
        path: &str,
        _opts: CreateOptions,
    ) -> Result<Box<dyn ObjectSink>, StorageError> {
        Err(StorageError::SessionInit {
            key: path.to_string(),
            source: "store offline".into(),
        })
    }

    async fn get(&self, path: &str) -> Result<ObjectReader, StorageError> {
        Err(StorageError::NotFound {
            key: path.to_string(),
        })
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        Err(StorageError::NotFound {
            key: path.to_string(),
        })
    }
}

#[tokio::test]
async fn failed_uploads_reach_the_dead_letter_drain() {
    let root = tempfile::tempdir().unwrap();
    let conf = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("x"), b"x").unwrap();
    std::fs::write(root.path().join("y"), b"y").unwrap();

    let (failure_policy, mut letters) = FailurePolicy::dead_letter();
    let server = SyncServer::new(
        root.path(),
        Arc::new(FailingStorage),
        SyncOptions {
            conf_path: conf.path().to_path_buf(),
            init_upload: true,
            pool_size: 0,
            failure_policy,
        },
    )
    .await
    .unwrap();

    let mut failed: Vec<PathBuf> = vec![
        letters.recv().await.unwrap().path,
        letters.recv().await.unwrap().path,
    ];
    failed.sort();
    assert!(failed[0].ends_with("x"));
    assert!(failed[1].ends_with("y"));

    server.close();
    server.closed().await;
}
