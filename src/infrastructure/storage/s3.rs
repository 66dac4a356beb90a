use super::{ObjectStore, ObjectWriter, StorageError, StorageResult, StoredObject};
use crate::common::upload::MultipartUploader;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, CorsConfiguration, CorsRule};
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub async fn new(
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO) bucket '{}'", bucket);

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Same client, different bucket.
    pub fn with_bucket(&self, bucket: &str) -> Self {
        Self {
            client: self.client.clone(),
            bucket: bucket.to_string(),
        }
    }

    /// Allow browsers on `origin` to fetch objects (and read the disposition
    /// header) straight from the bucket through signed links.
    pub async fn configure_cors(&self, origin: &str) -> StorageResult<()> {
        let rule = CorsRule::builder()
            .allowed_origins(origin)
            .allowed_methods("GET")
            .allowed_methods("HEAD")
            .expose_headers("Content-Type")
            .expose_headers("Content-Disposition")
            .max_age_seconds(3600)
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let cors = CorsConfiguration::builder()
            .cors_rules(rule)
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.client
            .put_bucket_cors()
            .bucket(&self.bucket)
            .cors_configuration(cors)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        info!("Bucket {} CORS updated to allow GET/HEAD from {}", self.bucket, origin);
        Ok(())
    }

    pub async fn create_multipart_upload(&self, key: &str, content_type: &str) -> StorageResult<String> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        result
            .upload_id
            .ok_or_else(|| StorageError::UploadFailed(format!("No upload id returned for {}", key)))
    }

    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: bytes::Bytes,
    ) -> StorageResult<CompletedPart> {
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        let e_tag = result.e_tag.ok_or_else(|| {
            StorageError::UploadFailed(format!("No ETag returned for part {} of {}", part_number, key))
        })?;

        Ok(CompletedPart::builder()
            .e_tag(e_tag)
            .part_number(part_number)
            .build())
    }

    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> StorageResult<String> {
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(format!("{}/{}", self.bucket, key))
    }

    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => match e.as_service_error() {
                Some(service) if service.is_not_found() => Ok(false),
                _ => Err(StorageError::Backend(format!(
                    "HEAD {}/{} failed: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))),
            },
        }
    }

    async fn size(&self, key: &str) -> StorageResult<u64> {
        let head = match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(head) => head,
            Err(e) => {
                return match e.as_service_error() {
                    Some(service) if service.is_not_found() => Err(StorageError::NotFound(key.to_string())),
                    _ => Err(StorageError::Backend(DisplayErrorContext(&e).to_string())),
                };
            }
        };

        Ok(head.content_length().unwrap_or(0).max(0) as u64)
    }

    async fn get(&self, key: &str, range: Option<&str>) -> StorageResult<StoredObject> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.map(str::to_string))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::NotFound(key.to_string()),
                _ => StorageError::DownloadFailed(DisplayErrorContext(&e).to_string()),
            })?;

        let content_type = resp.content_type().map(str::to_string);
        let content_length = resp.content_length().map(|len| len.max(0) as u64);
        let content_range = resp.content_range().map(str::to_string);
        let e_tag = resp.e_tag().map(str::to_string);

        Ok(StoredObject {
            body: Box::pin(resp.body.into_async_read()),
            content_type,
            content_length,
            content_range,
            e_tag,
        })
    }

    async fn create_writer(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn ObjectWriter>> {
        let uploader = MultipartUploader::new(self.clone(), key.to_string(), content_type).await?;
        Ok(Box::new(uploader))
    }

    async fn signed_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_disposition: &str,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(content_disposition)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
