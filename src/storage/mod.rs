pub mod backend;
mod chunker;
pub mod error;
pub mod local;
pub mod s3;

pub use backend::{CreateOptions, FileInfo, FileStorage, ObjectReader, ObjectSink};
pub use error::StorageError;
pub use local::LocalStorage;
pub use s3::{S3Conf, S3Storage};
