use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    Role,
    RabbitMqUrl,
    TranscodeQueue,
    MinioUrl,
    MinioRegion,
    MinioBucketIncoming,
    MinioBucketProcessed,
    MinioAccessKey,
    MinioSecretKey,
    FfmpegPath,
    MaxConcurrentPipelines,
    JobPrefetch,
    PipelineTimeoutSecs,
    RetryBackoffSecs,
    SignedUrlTtlSecs,
    RetryAfterSecs,
    MaxUploadBytes,
    CorsOrigin,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::Role => "APP_ROLE",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::TranscodeQueue => "TRANSCODE_QUEUE",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioRegion => "MINIO_REGION",
            EnvKey::MinioBucketIncoming => "MINIO_BUCKET_INCOMING",
            EnvKey::MinioBucketProcessed => "MINIO_BUCKET_PROCESSED",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::MaxConcurrentPipelines => "MAX_CONCURRENT_PIPELINES",
            EnvKey::JobPrefetch => "JOB_PREFETCH",
            EnvKey::PipelineTimeoutSecs => "PIPELINE_TIMEOUT_SECS",
            EnvKey::RetryBackoffSecs => "RETRY_BACKOFF_SECS",
            EnvKey::SignedUrlTtlSecs => "SIGNED_URL_TTL_SECS",
            EnvKey::RetryAfterSecs => "RETRY_AFTER_SECS",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::CorsOrigin => "CORS_ORIGIN",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Like [`get_parsed`], but an unset or unparsable value yields `None`.
pub fn get_optional<T: FromStr>(key: EnvKey) -> Option<T> {
    get(key).ok().and_then(|val| val.parse::<T>().ok())
}
