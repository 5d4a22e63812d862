//! Runtime configuration.
//!
//! Built once in main from an optional toml file plus CLI flags and
//! passed by value into the components that need it; there is no
//! process-wide mutable config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Conf {
    /// Local directory tree to mirror.
    pub path: PathBuf,
    /// Directory holding the sidecar state record.
    pub conf_path: PathBuf,
    /// S3-compatible endpoint URL.
    pub endpoint: String,
    /// Destination bucket.
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Byte threshold at which a buffered part is flushed remotely.
    pub block_size: usize,
    pub debug: bool,
    /// Upload all pre-existing files on first start.
    pub init_upload: bool,
    /// Concurrent uploads during the initial scan; 0 for sequential.
    pub pool_size: usize,
    /// Mirror into a local directory instead of an object store.
    pub local_root: Option<PathBuf>,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
            conf_path: PathBuf::from("./conf"),
            endpoint: String::new(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            block_size: DEFAULT_BLOCK_SIZE,
            debug: false,
            init_upload: false,
            pool_size: crate::sync::DEFAULT_POOL_SIZE,
            local_root: None,
        }
    }
}

impl Conf {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let conf = Conf::default();
        assert_eq!(conf.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(conf.pool_size, crate::sync::DEFAULT_POOL_SIZE);
        assert!(!conf.init_upload);
        assert!(conf.local_root.is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ossync.toml");
        std::fs::write(
            &file,
            r#"
path = "/srv/data"
endpoint = "http://localhost:9000"
bucket = "backup"
block-size = 5242880
init-upload = true
"#,
        )
        .unwrap();

        let conf = Conf::load(&file).unwrap();
        assert_eq!(conf.path, PathBuf::from("/srv/data"));
        assert_eq!(conf.endpoint, "http://localhost:9000");
        assert_eq!(conf.bucket, "backup");
        assert_eq!(conf.block_size, 5 * 1024 * 1024);
        assert!(conf.init_upload);
        // Unspecified keys keep their defaults.
        assert_eq!(conf.conf_path, PathBuf::from("./conf"));
        assert_eq!(conf.pool_size, crate::sync::DEFAULT_POOL_SIZE);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Conf::load(Path::new("/definitely/not/here.toml")).is_err());
    }
}
