pub mod rabbitmq;

use crate::modules::transcode::events::JobDescriptor;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rabbitmq::RabbitMqService;
use tracing::info;

/// Hands a job descriptor to the transcode channel.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, job: &JobDescriptor) -> Result<()>;
}

#[derive(Clone)]
pub struct RabbitJobPublisher {
    rabbitmq: RabbitMqService,
    queue: String,
}

impl RabbitJobPublisher {
    pub fn new(rabbitmq: RabbitMqService, queue: impl Into<String>) -> Self {
        Self {
            rabbitmq,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl JobPublisher for RabbitJobPublisher {
    async fn publish(&self, job: &JobDescriptor) -> Result<()> {
        let payload = serde_json::to_vec(job)
            .map_err(|e| anyhow!("Failed to encode job {:?}: {}", job, e))?;

        self.rabbitmq.publish(&self.queue, &payload).await?;

        info!("📨 Published transcoding job for {}", job.name);
        Ok(())
    }
}
