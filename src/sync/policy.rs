//! Per-upload failure handling strategy.
//!
//! Upload failures never stop the event loop; what happens to the
//! failed file is a first-class, independently testable policy
//! instead of an implicit log-and-forget.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

/// A failed upload handed to an external drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub path: PathBuf,
    pub error: String,
}

/// What to do when a file's upload fails.
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    /// Log the failure and move on.
    #[default]
    Drop,
    /// Retry with exponentially doubling delays, up to `max_attempts`
    /// total attempts, then give up.
    Retry {
        max_attempts: u32,
        backoff: Duration,
    },
    /// Log the failure and hand the path to the dead-letter drain.
    DeadLetter(mpsc::UnboundedSender<DeadLetter>),
}

impl FailurePolicy {
    /// A dead-letter policy plus the receiving end the embedder drains.
    pub fn dead_letter() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::DeadLetter(tx), rx)
    }

    /// Drive `op` to completion under this policy. Failures are fully
    /// absorbed here; the caller never sees them.
    pub async fn run<F, Fut, E>(&self, path: &Path, mut op: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        match self {
            FailurePolicy::Drop => {
                if let Err(err) = op().await {
                    warn!(path = %path.display(), error = %err, "upload failed, dropping");
                }
            }
            FailurePolicy::Retry {
                max_attempts,
                backoff,
            } => {
                let attempts = (*max_attempts).max(1);
                let mut delay = *backoff;
                for attempt in 1..=attempts {
                    match op().await {
                        Ok(()) => return,
                        Err(err) if attempt == attempts => {
                            warn!(
                                path = %path.display(),
                                error = %err,
                                attempts,
                                "upload failed, giving up"
                            );
                        }
                        Err(err) => {
                            warn!(
                                path = %path.display(),
                                error = %err,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "upload failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            delay *= 2;
                        }
                    }
                }
            }
            FailurePolicy::DeadLetter(tx) => {
                if let Err(err) = op().await {
                    warn!(path = %path.display(), error = %err, "upload failed, dead-lettering");
                    let _ = tx.send(DeadLetter {
                        path: path.to_path_buf(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn failing_op(counter: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<(), String>> {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn drop_runs_the_operation_once() {
        let calls = Arc::new(AtomicU32::new(0));
        FailurePolicy::Drop
            .run(Path::new("/x"), failing_op(calls.clone()))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_stops_at_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = FailurePolicy::Retry {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };
        policy.run(Path::new("/x"), failing_op(calls.clone())).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_on_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = FailurePolicy::Retry {
            max_attempts: 5,
            backoff: Duration::from_millis(1),
        };
        let counter = calls.clone();
        policy
            .run(Path::new("/x"), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(if n >= 1 { Ok(()) } else { Err("boom") })
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dead_letter_delivers_path_and_error() {
        let (policy, mut rx) = FailurePolicy::dead_letter();
        policy
            .run(Path::new("/data/f.txt"), || {
                std::future::ready(Err::<(), _>("no route to store"))
            })
            .await;
        let letter = rx.recv().await.unwrap();
        assert_eq!(letter.path, PathBuf::from("/data/f.txt"));
        assert_eq!(letter.error, "no route to store");
    }

    #[tokio::test]
    async fn success_sends_nothing_to_the_drain() {
        let (policy, mut rx) = FailurePolicy::dead_letter();
        policy
            .run(Path::new("/ok"), || std::future::ready(Ok::<(), String>(())))
            .await;
        drop(policy);
        assert!(rx.recv().await.is_none());
    }
}
