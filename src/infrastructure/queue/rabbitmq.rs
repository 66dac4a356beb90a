use anyhow::{anyhow, Result};
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// One AMQP connection shared by the publisher and the transcode consumer.
///
/// Publishing goes through a single long-lived channel; consumers open their
/// own with [`RabbitMqService::open_channel`] so their prefetch and lifetime
/// stay independent. Either kind is replaced transparently once the broker
/// closes it.
#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    conn: Arc<Mutex<Connection>>,
    publish_channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str) -> Result<Connection> {
        info!("Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        info!("Connected to RabbitMQ");
        Ok(conn)
    }

    pub async fn new(url: &str) -> Result<Self> {
        let conn = Self::connect(url).await?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))?;

        Ok(Self {
            url: url.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            publish_channel: Arc::new(Mutex::new(channel)),
        })
    }

    /// New channel on the live connection. Reconnects first when the
    /// connection itself is gone (broker restart, network drop).
    pub async fn open_channel(&self) -> Result<Channel> {
        let mut conn = self.conn.lock().await;

        if !conn.status().connected() {
            warn!("RabbitMQ connection dropped, reconnecting...");
            *conn = Self::connect(&self.url).await?;
        }

        conn.create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create channel: {}", e))
    }

    /// Durable queue, so jobs survive a broker restart.
    pub async fn declare_queue(channel: &Channel, queue: &str) -> Result<()> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue: {}", e))?;

        Ok(())
    }

    async fn publisher(&self, force_new: bool) -> Result<Channel> {
        let mut channel = self.publish_channel.lock().await;

        if force_new || !channel.status().connected() {
            *channel = self.open_channel().await?;
        }

        Ok(channel.clone())
    }

    async fn publish_on(&self, channel: &Channel, queue: &str, payload: &[u8]) -> Result<()> {
        Self::declare_queue(channel, queue).await?;

        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message: {}", e))?
            .await
            .map_err(|e| anyhow!("Failed to confirm publication: {}", e))?;

        Ok(())
    }

    /// Publish a persistent message, retrying once on a fresh channel.
    pub async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()> {
        let channel = self.publisher(false).await?;

        if let Err(e) = self.publish_on(&channel, queue, payload).await {
            warn!("RabbitMQ publish failed: {}. Retrying on a new channel.", e);
            let channel = self.publisher(true).await?;
            self.publish_on(&channel, queue, payload).await?;
        }

        Ok(())
    }

    pub async fn close(&self) {
        let conn = self.conn.lock().await;
        if let Err(e) = conn.close(200, "shutting down").await {
            warn!("Failed to close RabbitMQ connection: {}", e);
        }
    }
}
