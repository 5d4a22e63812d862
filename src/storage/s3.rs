//! S3-compatible object store backend.
//!
//! [`S3Storage`] holds one long-lived client; each `create` starts a
//! multipart session and hands back a [`MultipartSink`] that owns it
//! exclusively. Parts are numbered from 1 and strictly sequential,
//! which the completion call requires.

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use async_trait::async_trait;
use tracing::debug;

use crate::storage::backend::{
    file_name, CreateOptions, FileInfo, FileStorage, ObjectReader, ObjectSink,
};
use crate::storage::chunker::PartBuffer;
use crate::storage::error::{Result, StorageError};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Conf {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

pub struct S3Storage {
    client: Client,
    bucket: String,
    block_size: usize,
}

impl S3Storage {
    /// Build a client with static credentials against a custom
    /// endpoint. Path-style addressing keeps MinIO and friends happy.
    pub fn new(conf: &S3Conf, block_size: usize) -> Self {
        let creds = Credentials::new(&conf.access_key, &conf.secret_key, None, None, "static");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(&conf.endpoint)
            .credentials_provider(creds)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(config),
            bucket: conf.bucket.clone(),
            block_size,
        }
    }

    /// Build a client from the standard AWS credential chain
    /// (environment, shared credentials file, instance profile),
    /// optionally pointed at a non-default endpoint.
    pub async fn from_env(
        bucket: impl Into<String>,
        endpoint: Option<&str>,
        block_size: usize,
    ) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.into(),
            block_size,
        }
    }
}

#[async_trait]
impl FileStorage for S3Storage {
    async fn create(&self, path: &str, opts: CreateOptions) -> Result<Box<dyn ObjectSink>> {
        let mut req = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(path);
        if let Some(content_type) = &opts.content_type {
            req = req.content_type(content_type);
        }
        let started = req.send().await.map_err(|err| StorageError::SessionInit {
            key: path.to_string(),
            source: err.into(),
        })?;
        let upload_id = started
            .upload_id
            .ok_or_else(|| StorageError::SessionInit {
                key: path.to_string(),
                source: "store returned no upload id".into(),
            })?;
        debug!(key = path, upload_id, "started multipart session");

        Ok(Box::new(MultipartSink {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: path.to_string(),
            upload_id,
            next_part: 1,
            completed: Vec::new(),
            buf: PartBuffer::new(self.block_size),
        }))
    }

    async fn get(&self, path: &str) -> Result<ObjectReader> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    StorageError::NotFound {
                        key: path.to_string(),
                    }
                } else {
                    StorageError::Remote {
                        key: path.to_string(),
                        source: err.into(),
                    }
                }
            })?;
        Ok(Box::new(resp.body.into_async_read()))
    }

    async fn stat(&self, path: &str) -> Result<FileInfo> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    StorageError::NotFound {
                        key: path.to_string(),
                    }
                } else {
                    StorageError::Remote {
                        key: path.to_string(),
                        source: err.into(),
                    }
                }
            })?;
        Ok(FileInfo {
            path: path.to_string(),
            file_name: file_name(path).to_string(),
            size: resp.content_length.unwrap_or(0) as u64,
        })
    }
}

/// One in-progress multipart session. Owned by exactly one caller;
/// never aborted on failure, so a failed close leaves the remote
/// session dangling.
struct MultipartSink {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    next_part: i32,
    completed: Vec<CompletedPart>,
    buf: PartBuffer,
}

impl MultipartSink {
    async fn upload_part(&mut self, data: Vec<u8>) -> Result<()> {
        let part_number = self.next_part;
        let size = data.len();
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| StorageError::PartUpload {
                key: self.key.clone(),
                part_number,
                source: err.into(),
            })?;
        debug!(key = %self.key, part_number, size, "uploaded part");
        self.completed.push(
            CompletedPart::builder()
                .set_e_tag(resp.e_tag)
                .part_number(part_number)
                .build(),
        );
        self.next_part += 1;
        Ok(())
    }
}

#[async_trait]
impl ObjectSink for MultipartSink {
    async fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.buf.extend(bytes);
        // A block leaves the accumulator only once the store has
        // accepted it; a failed part leaves the buffered state intact.
        while let Some(block) = self.buf.first_block() {
            self.upload_part(block).await?;
            self.buf.pop_block();
        }
        Ok(bytes.len())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let remainder = self.buf.take_remainder();
        // The store rejects a completion listing zero parts, so an
        // object that never reached one block still gets a final
        // (possibly empty) part.
        if !remainder.is_empty() || self.completed.is_empty() {
            if let Err(err) = self.upload_part(remainder).await {
                return Err(StorageError::Finalize {
                    key: self.key.clone(),
                    source: err.into(),
                });
            }
        }
        let parts = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.completed)))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(parts)
            .send()
            .await
            .map_err(|err| StorageError::Finalize {
                key: self.key.clone(),
                source: err.into(),
            })?;
        debug!(key = %self.key, parts = self.next_part - 1, "completed multipart session");
        Ok(())
    }
}
