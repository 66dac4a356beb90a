use super::service::{ReadinessResult, VariantHandle};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub filename: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VariantResponse {
    /// Profile name, e.g. `720p`.
    pub quality: String,
    /// Time-limited download link.
    pub url: String,
    /// Human readable size, e.g. `12.3 MB`.
    pub size: String,
}

impl From<VariantHandle> for VariantResponse {
    fn from(variant: VariantHandle) -> Self {
        Self {
            quality: variant.profile.name.to_string(),
            url: variant.url,
            size: format_size(variant.size_bytes),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessedVideoResponse {
    pub variants: Vec<VariantResponse>,
}

impl From<ReadinessResult> for ProcessedVideoResponse {
    fn from(result: ReadinessResult) -> Self {
        Self {
            variants: result.variants.into_iter().map(VariantResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotReadyResponse {
    pub error: String,
    pub message: String,
    /// Seconds the client should wait before polling again.
    pub retry_after: u64,
}

impl NotReadyResponse {
    pub fn new(retry_after: u64) -> Self {
        Self {
            error: "File not found".to_string(),
            message: "Video is still being processed. Please try again after some time.".to_string(),
            retry_after,
        }
    }
}

/// Size in MiB with one decimal, labelled `MB`.
pub fn format_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}
