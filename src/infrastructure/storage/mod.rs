//! Object storage seam.
//!
//! The coordinator and the readiness oracle only need key existence, sizes,
//! streaming reads, finalize-on-close writes and signed links. Everything
//! else about the backing store stays in [`s3`].

pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// A (possibly ranged) object body plus the headers needed to proxy it.
pub struct StoredObject {
    pub body: ObjectReader,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub e_tag: Option<String>,
}

/// Incremental writer whose object only becomes visible on [`finish`].
///
/// Readers never observe a partially written object: until `finish` returns
/// the key either does not exist or still holds its previous content.
///
/// [`finish`]: ObjectWriter::finish
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Publish the object. Returns the number of bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(false)` only when the backend positively reports the key as absent.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn size(&self, key: &str) -> StorageResult<u64>;

    /// Open a streaming read. `range` is an HTTP `Range` header value.
    async fn get(&self, key: &str, range: Option<&str>) -> StorageResult<StoredObject>;

    async fn create_writer(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn ObjectWriter>>;

    /// Time-limited GET link that answers with the given `Content-Disposition`.
    async fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_disposition: &str,
    ) -> StorageResult<String>;
}
