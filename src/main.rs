use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ossync::config::Conf;
use ossync::storage::{FileStorage, LocalStorage, S3Conf, S3Storage};
use ossync::sync::{SyncOptions, SyncServer};

/// Grace period for shutdown after an interrupt.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Mirror a local directory tree into an S3-compatible bucket.
#[derive(Debug, Parser)]
#[command(name = "ossync", version, about)]
struct Cli {
    /// Config file (toml); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local directory tree to mirror
    #[arg(long)]
    path: Option<PathBuf>,

    /// Directory holding the sidecar state record
    #[arg(long)]
    conf_path: Option<PathBuf>,

    /// S3-compatible endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Destination bucket
    #[arg(long)]
    bucket: Option<String>,

    #[arg(long)]
    access_key: Option<String>,

    #[arg(long)]
    secret_key: Option<String>,

    /// Part size in bytes for multipart uploads
    #[arg(long)]
    block_size: Option<usize>,

    /// Upload all pre-existing files on first start
    #[arg(long)]
    init_upload: bool,

    /// Concurrent uploads during the initial scan (0 = sequential)
    #[arg(long)]
    pool_size: Option<usize>,

    /// Mirror into a local directory instead of an object store
    #[arg(long)]
    local: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn into_conf(self) -> Result<Conf> {
        let mut conf = match &self.config {
            Some(file) => Conf::load(file)?,
            None => Conf::default(),
        };
        if let Some(path) = self.path {
            conf.path = path;
        }
        if let Some(conf_path) = self.conf_path {
            conf.conf_path = conf_path;
        }
        if let Some(endpoint) = self.endpoint {
            conf.endpoint = endpoint;
        }
        if let Some(bucket) = self.bucket {
            conf.bucket = bucket;
        }
        if let Some(access_key) = self.access_key {
            conf.access_key = access_key;
        }
        if let Some(secret_key) = self.secret_key {
            conf.secret_key = secret_key;
        }
        if let Some(block_size) = self.block_size {
            conf.block_size = block_size;
        }
        if let Some(pool_size) = self.pool_size {
            conf.pool_size = pool_size;
        }
        if let Some(local) = self.local {
            conf.local_root = Some(local);
        }
        conf.init_upload |= self.init_upload;
        conf.debug |= self.debug;
        Ok(conf)
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "ossync=debug" } else { "ossync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_storage(conf: &Conf) -> Result<Arc<dyn FileStorage>> {
    if let Some(local_root) = &conf.local_root {
        info!(root = %local_root.display(), "using local backend");
        return Ok(Arc::new(LocalStorage::new(local_root)?));
    }
    if conf.bucket.is_empty() {
        bail!("--bucket is required unless --local is set");
    }
    // Without a static key pair, defer to the standard AWS credential
    // chain (environment, shared profile, instance metadata).
    if conf.access_key.is_empty() || conf.secret_key.is_empty() {
        info!(bucket = %conf.bucket, "using object store backend with ambient credentials");
        let endpoint = (!conf.endpoint.is_empty()).then_some(conf.endpoint.as_str());
        return Ok(Arc::new(
            S3Storage::from_env(conf.bucket.clone(), endpoint, conf.block_size).await,
        ));
    }
    if conf.endpoint.is_empty() {
        bail!("--endpoint is required with static credentials");
    }
    info!(endpoint = %conf.endpoint, bucket = %conf.bucket, "using object store backend");
    Ok(Arc::new(S3Storage::new(
        &S3Conf {
            endpoint: conf.endpoint.clone(),
            bucket: conf.bucket.clone(),
            access_key: conf.access_key.clone(),
            secret_key: conf.secret_key.clone(),
        },
        conf.block_size,
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let conf = cli.into_conf()?;
    init_tracing(conf.debug);
    info!(
        path = %conf.path.display(),
        conf_path = %conf.conf_path.display(),
        block_size = conf.block_size,
        init_upload = conf.init_upload,
        pool_size = conf.pool_size,
        "starting"
    );

    let storage = build_storage(&conf).await?;
    let server = SyncServer::new(
        &conf.path,
        storage,
        SyncOptions {
            conf_path: conf.conf_path.clone(),
            init_upload: conf.init_upload,
            pool_size: conf.pool_size,
            failure_policy: Default::default(),
        },
    )
    .await
    .context("failed to start sync server")?;

    shutdown_signal().await;
    info!("shutting down");
    server.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, server.closed())
        .await
        .is_err()
    {
        warn!("shutdown grace period expired");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_requires_a_bucket_without_local_root() {
        let conf = Conf::default();
        assert!(build_storage(&conf).await.is_err());
    }

    #[tokio::test]
    async fn static_credentials_require_an_endpoint() {
        let conf = Conf {
            bucket: "backup".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            ..Conf::default()
        };
        assert!(build_storage(&conf).await.is_err());
    }
}
