//! Drives one job descriptor to completion: every profile gets its own
//! encode pipeline, and the job only succeeds when all of them do.

use super::encoder::{EncodeError, EncodeOutput, Encoder};
use super::events::JobDescriptor;
use crate::common::naming::{self, NamingError, VARIANT_CONTENT_TYPE};
use crate::common::profile::{TranscodeProfile, PROFILES};
use crate::infrastructure::storage::{ObjectStore, ObjectWriter, StorageError};
use futures_util::future::join_all;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// What the message channel should do with a delivery once it is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Every variant is written.
    Ack,
    /// Worth another attempt: redeliver.
    Requeue,
    /// Redelivery cannot help: drop for good.
    Discard,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Encoder output stream failed: {0}")]
    Output(#[source] std::io::Error),

    #[error("Pipeline timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Pipeline pool is shut down")]
    Closed,
}

#[derive(Debug)]
pub struct ProfileFailure {
    pub profile: &'static str,
    pub error: PipelineError,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid asset name: {0}")]
    InvalidName(#[from] NamingError),

    #[error("Input {0} does not exist")]
    InputMissing(String),

    #[error("Could not verify input {asset}: {source}")]
    InputCheck {
        asset: String,
        #[source]
        source: StorageError,
    },

    #[error("{} of {} pipelines failed for {asset}", .failures.len(), PROFILES.len())]
    PipelinesFailed {
        asset: String,
        failures: Vec<ProfileFailure>,
    },
}

impl JobError {
    pub fn disposition(&self) -> Disposition {
        match self {
            JobError::Malformed(_) | JobError::InvalidName(_) | JobError::InputMissing(_) => {
                Disposition::Discard
            }
            JobError::InputCheck { .. } | JobError::PipelinesFailed { .. } => Disposition::Requeue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantWritten {
    pub profile: &'static str,
    pub key: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Active pipelines across all jobs in this process.
    pub max_concurrent_pipelines: usize,
    pub pipeline_timeout: Option<Duration>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            max_concurrent_pipelines: 4,
            pipeline_timeout: None,
        }
    }
}

pub struct TranscodeCoordinator {
    incoming: Arc<dyn ObjectStore>,
    processed: Arc<dyn ObjectStore>,
    encoder: Arc<dyn Encoder>,
    pipelines: Semaphore,
    pipeline_timeout: Option<Duration>,
}

impl TranscodeCoordinator {
    pub fn new(
        incoming: Arc<dyn ObjectStore>,
        processed: Arc<dyn ObjectStore>,
        encoder: Arc<dyn Encoder>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            incoming,
            processed,
            encoder,
            pipelines: Semaphore::new(options.max_concurrent_pipelines.max(1)),
            pipeline_timeout: options.pipeline_timeout,
        }
    }

    /// Stop admitting pipelines. Jobs still waiting for a slot fail and get
    /// requeued; pipelines already running finish normally.
    pub fn close(&self) {
        self.pipelines.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pipelines.is_closed()
    }

    /// Parse and run a raw delivery, returning how it should be settled.
    pub async fn handle_payload(&self, payload: &[u8]) -> Disposition {
        let result = match serde_json::from_slice::<JobDescriptor>(payload) {
            Ok(job) => self.process_job(&job).await,
            Err(e) => Err(JobError::from(e)),
        };

        match result {
            Ok(written) => {
                info!("✅ Job completed successfully: {} variants written", written.len());
                Disposition::Ack
            }
            Err(JobError::PipelinesFailed { asset, failures }) => {
                for failure in &failures {
                    error!(asset = %asset, profile = failure.profile, "❌ Pipeline failed: {}", failure.error);
                }
                error!(
                    "❌ {} of {} pipelines failed for {}, requeueing",
                    failures.len(),
                    PROFILES.len(),
                    asset
                );
                Disposition::Requeue
            }
            Err(e) => {
                let disposition = e.disposition();
                error!("❌ Failed to process job: {} ({:?})", e, disposition);
                disposition
            }
        }
    }

    pub async fn process_job(&self, job: &JobDescriptor) -> Result<Vec<VariantWritten>, JobError> {
        let asset = job.name.as_str();
        naming::validate_asset_name(asset)?;

        match self.incoming.exists(asset).await {
            Ok(true) => info!("Input file {} verified successfully", asset),
            Ok(false) => return Err(JobError::InputMissing(asset.to_string())),
            Err(source) => {
                return Err(JobError::InputCheck {
                    asset: asset.to_string(),
                    source,
                });
            }
        }

        let outcomes = join_all(PROFILES.iter().map(|profile| self.run_pipeline(asset, *profile))).await;

        let mut written = Vec::with_capacity(PROFILES.len());
        let mut failures = Vec::new();
        for (profile, outcome) in PROFILES.iter().zip(outcomes) {
            match outcome {
                Ok(variant) => written.push(variant),
                Err(error) => failures.push(ProfileFailure {
                    profile: profile.name,
                    error,
                }),
            }
        }

        if failures.is_empty() {
            info!("All transcoding and uploads completed for {}", asset);
            Ok(written)
        } else {
            Err(JobError::PipelinesFailed {
                asset: asset.to_string(),
                failures,
            })
        }
    }

    async fn run_pipeline(
        &self,
        asset: &str,
        profile: TranscodeProfile,
    ) -> Result<VariantWritten, PipelineError> {
        let _permit = self.pipelines.acquire().await.map_err(|_| PipelineError::Closed)?;

        let key = naming::variant_key(asset, &profile);
        info!(asset, profile = profile.name, key = %key, "🎬 Transcoding started");

        let input = self.incoming.get(asset, None).await?.body;
        let output = self.encoder.encode(input, &profile).await?;
        let mut writer = self.processed.create_writer(&key, VARIANT_CONTENT_TYPE).await?;

        let pumped = match self.pipeline_timeout {
            Some(limit) => tokio::time::timeout(limit, pump(output, writer.as_mut()))
                .await
                .unwrap_or(Err(PipelineError::TimedOut(limit))),
            None => pump(output, writer.as_mut()).await,
        };

        if let Err(e) = pumped {
            if let Err(abort_err) = writer.abort().await {
                warn!(key = %key, "Failed to abort partial upload: {}", abort_err);
            }
            return Err(e);
        }

        let bytes = writer.finish().await?;
        info!(asset, profile = profile.name, bytes, "Transcoding completed for {} and uploaded", profile.name);

        Ok(VariantWritten {
            profile: profile.name,
            key,
            bytes,
        })
    }
}

/// Copy encoder output into `writer`, then wait for the encoder's verdict.
async fn pump(output: EncodeOutput, writer: &mut dyn ObjectWriter) -> Result<(), PipelineError> {
    let EncodeOutput { mut stream, completion } = output;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(PipelineError::Output)?;
        writer.write_chunk(chunk).await?;
    }

    completion.await?;
    Ok(())
}
