use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::modules::transcode::coordinator::{Disposition, TranscodeCoordinator};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    BasicRejectOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

/// How long shutdown waits for in-flight jobs before abandoning them to
/// broker redelivery.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

const RESUBSCRIBE_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Wait before resubscribe attempt `attempt` (0-based): 1s doubling up to 30s.
fn resubscribe_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(5)).min(RESUBSCRIBE_BACKOFF_MAX)
}

/// The three ways a delivery can be settled with the broker.
#[async_trait]
pub trait DeliverySettler: Send + Sync {
    async fn ack(&self) -> Result<(), lapin::Error>;
    async fn requeue(&self) -> Result<(), lapin::Error>;
    async fn discard(&self) -> Result<(), lapin::Error>;
}

#[async_trait]
impl DeliverySettler for Delivery {
    async fn ack(&self) -> Result<(), lapin::Error> {
        self.acker.ack(BasicAckOptions::default()).await.map(|_| ())
    }

    async fn requeue(&self) -> Result<(), lapin::Error> {
        self.acker.nack(
            BasicNackOptions {
                requeue: true,
                ..BasicNackOptions::default()
            },
        )
        .await
        .map(|_| ())
    }

    async fn discard(&self) -> Result<(), lapin::Error> {
        self.acker.reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
    }
}

/// Apply `disposition`. A requeue first waits `retry_backoff`, because broker
/// redelivery is immediate, unless the worker is already shutting down.
pub async fn settle<S: DeliverySettler + ?Sized>(
    settler: &S,
    disposition: Disposition,
    retry_backoff: Duration,
    shutting_down: bool,
) -> Result<(), lapin::Error> {
    match disposition {
        Disposition::Ack => settler.ack().await,
        Disposition::Requeue => {
            if !shutting_down {
                tokio::time::sleep(retry_backoff).await;
            }
            settler.requeue().await
        }
        Disposition::Discard => settler.discard().await,
    }
}

struct Subscription {
    channel: Channel,
    consumer: Consumer,
    tag: String,
}

enum StreamEnd {
    Shutdown,
    Closed,
}

pub struct TranscoderWorker {
    rabbitmq: RabbitMqService,
    coordinator: Arc<TranscodeCoordinator>,
    queue: String,
    prefetch: u16,
    retry_backoff: Duration,
}

impl TranscoderWorker {
    pub fn new(
        rabbitmq: RabbitMqService,
        coordinator: Arc<TranscodeCoordinator>,
        queue: impl Into<String>,
        prefetch: u16,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            rabbitmq,
            coordinator,
            queue: queue.into(),
            prefetch,
            retry_backoff,
        }
    }

    /// Subscribe to the job queue and start consuming in the background.
    /// The first subscription must succeed; later channel losses are
    /// recovered inside the task. The task finishes once `shutdown` flips to
    /// `true` and every in-flight job has been settled.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        info!("🎥 Starting Transcoder Worker...");

        let subscription = self.subscribe().await?;

        Ok(tokio::spawn(self.run(subscription, shutdown)))
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let channel = self.rabbitmq.open_channel().await?;

        RabbitMqService::declare_queue(&channel, &self.queue).await?;

        // Prefetch bounds how many jobs this consumer holds unacknowledged.
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set prefetch: {}", e))?;

        let tag = format!("transcoder-{}", Uuid::new_v4());
        let consumer = channel
            .basic_consume(
                &self.queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!("🎥 Transcoder Worker listening on '{}' as {}", self.queue, tag);

        Ok(Subscription {
            channel,
            consumer,
            tag,
        })
    }

    async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        let mut in_flight = JoinSet::new();

        loop {
            match self
                .consume(&mut subscription.consumer, &mut in_flight, &mut shutdown)
                .await
            {
                StreamEnd::Shutdown => {
                    if let Err(e) = subscription
                        .channel
                        .basic_cancel(&subscription.tag, BasicCancelOptions::default())
                        .await
                    {
                        warn!("Failed to cancel consumer {}: {}", subscription.tag, e);
                    }
                    break;
                }
                StreamEnd::Closed => {
                    // Jobs still running here lost their channel; their settle
                    // fails and the broker redelivers them.
                    warn!(
                        "Consumer stream for '{}' ended with {} job(s) in flight, resubscribing",
                        self.queue,
                        in_flight.len()
                    );
                    match self.resubscribe(&mut shutdown).await {
                        Some(next) => subscription = next,
                        None => break,
                    }
                }
            }
        }

        info!("🛑 Stopping Transcoder Worker, {} job(s) in flight", in_flight.len());

        self.coordinator.close();

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!("Transcoding task aborted: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Abandoning {} unfinished job(s) to redelivery", in_flight.len());
            in_flight.abort_all();
        }

        info!("Transcoder Worker stopped");
    }

    async fn consume(
        &self,
        consumer: &mut Consumer,
        in_flight: &mut JoinSet<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return StreamEnd::Shutdown;
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Transcoding task aborted: {}", e);
                    }
                }
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => {
                        let coordinator = Arc::clone(&self.coordinator);
                        in_flight.spawn(handle_delivery(coordinator, delivery, self.retry_backoff));
                    }
                    Some(Err(e)) => error!("Failed to receive delivery: {}", e),
                    None => return StreamEnd::Closed,
                },
            }
        }
    }

    /// Keep trying to subscribe again until it works or shutdown is requested.
    async fn resubscribe(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Subscription> {
        let mut attempt = 0;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                    continue;
                }
                _ = tokio::time::sleep(resubscribe_delay(attempt)) => {}
            }

            match self.subscribe().await {
                Ok(subscription) => return Some(subscription),
                Err(e) => {
                    error!("Resubscribe to '{}' failed (attempt {}): {}", self.queue, attempt + 1, e);
                    attempt += 1;
                }
            }
        }
    }
}

async fn handle_delivery(
    coordinator: Arc<TranscodeCoordinator>,
    delivery: Delivery,
    retry_backoff: Duration,
) {
    info!(
        redelivered = delivery.redelivered,
        "📦 Received transcoding job"
    );

    let disposition = coordinator.handle_payload(&delivery.data).await;

    if let Err(e) = settle(&delivery, disposition, retry_backoff, coordinator.is_closed()).await {
        error!("Failed to settle message ({:?}): {}", disposition, e);
    }
}
