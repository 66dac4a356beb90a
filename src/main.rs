use anyhow::anyhow;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use variant_relay::app;
use variant_relay::config::settings::AppConfig;
use variant_relay::infrastructure::queue::rabbitmq::RabbitMqService;
use variant_relay::infrastructure::queue::RabbitJobPublisher;
use variant_relay::infrastructure::storage::s3::StorageService;
use variant_relay::modules::transcode::coordinator::{CoordinatorOptions, TranscodeCoordinator};
use variant_relay::modules::transcode::encoder::FfmpegEncoder;
use variant_relay::state::AppState;
use variant_relay::workers::transcoder::TranscoderWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = AppConfig::new().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    info!("Starting {:?} role...", config.role);

    let incoming = StorageService::new(
        &config.minio_url,
        &config.minio_region,
        &config.incoming_bucket,
        &config.minio_access_key,
        &config.minio_secret_key,
    )
    .await;
    let processed = incoming.with_bucket(&config.processed_bucket);

    let rabbitmq = RabbitMqService::new(&config.rabbitmq_url).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = if config.role.runs_worker() {
        let coordinator = Arc::new(TranscodeCoordinator::new(
            Arc::new(incoming.clone()),
            Arc::new(processed.clone()),
            Arc::new(FfmpegEncoder::new(config.ffmpeg_path.clone())),
            CoordinatorOptions {
                max_concurrent_pipelines: config.max_concurrent_pipelines,
                pipeline_timeout: config.pipeline_timeout,
            },
        ));

        let worker = TranscoderWorker::new(
            rabbitmq.clone(),
            coordinator,
            config.transcode_queue.clone(),
            config.job_prefetch,
            config.retry_backoff,
        );
        Some(worker.start(shutdown_rx).await?)
    } else {
        None
    };

    if config.role.runs_api() {
        if let Err(e) = processed.configure_cors(&config.cors_origin).await {
            warn!("Could not configure CORS on {}: {}", config.processed_bucket, e);
        }

        let publisher = Arc::new(RabbitJobPublisher::new(rabbitmq.clone(), config.transcode_queue.clone()));
        let port = config.server_port;
        let state = AppState::new(config, Arc::new(incoming), Arc::new(processed), publisher);

        let app = app::create_app(state).await;

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!("Server running on http://0.0.0.0:{}", port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker {
        if let Err(e) = handle.await {
            error!("Transcoder worker panicked: {}", e);
        }
    }

    rabbitmq.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
