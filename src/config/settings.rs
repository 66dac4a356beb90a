use crate::config::env::{self, EnvKey};
use std::str::FromStr;
use std::time::Duration;

/// Which components this process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceRole {
    /// HTTP API and transcode worker in one process.
    All,
    /// Ingest and readiness endpoints only.
    Api,
    /// Transcode coordinator only.
    Worker,
}

impl ServiceRole {
    pub fn runs_api(self) -> bool {
        matches!(self, ServiceRole::All | ServiceRole::Api)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, ServiceRole::All | ServiceRole::Worker)
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ServiceRole::All),
            "api" => Ok(ServiceRole::Api),
            "worker" => Ok(ServiceRole::Worker),
            other => Err(format!("unknown APP_ROLE '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub role: ServiceRole,
    pub rabbitmq_url: String,
    pub transcode_queue: String,
    pub minio_url: String,
    pub minio_region: String,
    pub incoming_bucket: String,
    pub processed_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub ffmpeg_path: String,
    pub max_concurrent_pipelines: usize,
    pub job_prefetch: u16,
    pub pipeline_timeout: Option<Duration>,
    pub retry_backoff: Duration,
    pub signed_url_ttl: Duration,
    pub retry_after_secs: u64,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            role: env::get_parsed(EnvKey::Role, ServiceRole::All),
            rabbitmq_url: env::get(EnvKey::RabbitMqUrl)?,
            transcode_queue: env::get_or(EnvKey::TranscodeQueue, "transcoding_tasks"),
            minio_url: env::get(EnvKey::MinioUrl)?,
            minio_region: env::get_or(EnvKey::MinioRegion, "us-east-1"),
            incoming_bucket: env::get(EnvKey::MinioBucketIncoming)?,
            processed_bucket: env::get(EnvKey::MinioBucketProcessed)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            // A zero-permit semaphore would stall every job forever.
            max_concurrent_pipelines: env::get_parsed(EnvKey::MaxConcurrentPipelines, 4usize).max(1),
            job_prefetch: env::get_parsed(EnvKey::JobPrefetch, 2u16).max(1),
            pipeline_timeout: env::get_optional::<u64>(EnvKey::PipelineTimeoutSecs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            retry_backoff: Duration::from_secs(env::get_parsed(EnvKey::RetryBackoffSecs, 10)),
            signed_url_ttl: Duration::from_secs(env::get_parsed(EnvKey::SignedUrlTtlSecs, 86_400)),
            retry_after_secs: env::get_parsed(EnvKey::RetryAfterSecs, 30),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, 500 * 1024 * 1024),
            cors_origin: env::get_or(EnvKey::CorsOrigin, "http://localhost:5173"),
        })
    }
}
