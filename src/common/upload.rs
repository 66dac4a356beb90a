use crate::infrastructure::storage::s3::StorageService;
use crate::infrastructure::storage::{ObjectStore, ObjectWriter, StorageError, StorageResult};
use async_trait::async_trait;
use axum::extract::multipart::{Field, MultipartError};
use axum::{body::Bytes, http::StatusCode};
use thiserror::Error;
use tracing::{error, warn};

// Minimum part size for S3 is 5MB. We use 6MB to be safe.
const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

/// Streams bytes into an S3 multipart upload. Nothing is visible under `key`
/// until [`ObjectWriter::finish`] completes the upload.
pub struct MultipartUploader {
    storage: StorageService,
    key: String,
    upload_id: String,
    parts: Vec<aws_sdk_s3::types::CompletedPart>,
    part_number: i32,
    buffer: Vec<u8>,
    bytes_written: u64,
}

impl MultipartUploader {
    pub async fn new(storage: StorageService, key: String, content_type: &str) -> StorageResult<Self> {
        let upload_id = storage.create_multipart_upload(&key, content_type).await?;

        Ok(Self {
            storage,
            key,
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
            bytes_written: 0,
        })
    }

    async fn flush_part(&mut self) -> StorageResult<()> {
        let body = Bytes::from(std::mem::replace(&mut self.buffer, Vec::with_capacity(MIN_PART_SIZE)));

        let part = self
            .storage
            .upload_part(&self.key, &self.upload_id, self.part_number, body)
            .await?;

        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for MultipartUploader {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.bytes_written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        // S3 refuses to complete an upload with zero parts, so an empty
        // object still ships one (empty) final part.
        if !self.buffer.is_empty() || self.parts.is_empty() {
            self.flush_part().await?;
        }

        let parts = std::mem::take(&mut self.parts);
        self.storage
            .complete_multipart_upload(&self.key, &self.upload_id, parts)
            .await?;

        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.storage
            .abort_multipart_upload(&self.key, &self.upload_id)
            .await
    }
}

/// Content type to store an upload under, or `None` when it is not a video.
///
/// Browsers occasionally send no type for a file part, in which case the
/// filename extension decides.
pub fn video_content_type(declared: Option<&str>, file_name: &str) -> Option<String> {
    let mime = match declared {
        Some(raw) => raw.parse::<mime::Mime>().ok()?,
        None => mime_guess::from_path(file_name).first()?,
    };

    (mime.type_() == mime::VIDEO).then(|| mime.essence_str().to_string())
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload stream interrupted: {0}")]
    Body(#[from] MultipartError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl UploadError {
    /// Body errors keep the status axum assigns them (413 past the body
    /// limit); storage errors are the server's fault.
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::Body(e) => e.status(),
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Stream a multipart field into `store` under `key` without buffering the
/// whole file. Returns the number of bytes stored.
pub async fn stream_to_store(
    store: &dyn ObjectStore,
    mut field: Field<'_>,
    key: &str,
    content_type: &str,
) -> Result<u64, UploadError> {
    let mut writer = store.create_writer(key, content_type).await?;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                error!("Stream error: {}", e);
                abort_quietly(writer, key).await;
                return Err(e.into());
            }
        };

        if let Err(e) = writer.write_chunk(chunk).await {
            error!("Upload error: {}", e);
            abort_quietly(writer, key).await;
            return Err(e.into());
        }
    }

    Ok(writer.finish().await?)
}

async fn abort_quietly(writer: Box<dyn ObjectWriter>, key: &str) {
    if let Err(e) = writer.abort().await {
        warn!("Failed to abort upload of {}: {}", key, e);
    }
}
