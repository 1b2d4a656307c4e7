//! AMQP broker backed by lapin

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

use crate::application::errors::BrokerError;
use crate::domain::traits::{Broker, Delivery};
use crate::infrastructure::config::BrokerConfig;

const REPLY_SUCCESS: u16 = 200;

/// One connection and one channel, owned for the life of the process
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
    consumer_tag: String,
    durable: bool,
}

impl AmqpBroker {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection.create_channel().await?;

        // One unacknowledged delivery at a time keeps processing sequential
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;

        tracing::info!("Connected to broker (channel {})", channel.id());
        Ok(Self {
            connection,
            channel,
            consumer: None,
            consumer_tag: config.consumer_tag.clone(),
            durable: config.durable_queues,
        })
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_queue(&mut self, queue: &str) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: self.durable,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        tracing::debug!("Declared queue '{}'", queue);
        Ok(())
    }

    async fn consume(&mut self, queue: &str) -> Result<(), BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, BrokerError> {
        let consumer = self.consumer.as_mut().ok_or(BrokerError::NotConsuming)?;
        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery {
                tag: delivery.delivery_tag,
                redelivered: delivery.redelivered,
                body: delivery.data,
            })),
            Some(Err(e)) => Err(BrokerError::Channel(e.to_string())),
            None => Ok(None),
        }
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let publish_error = |e: lapin::Error| BrokerError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        let properties = BasicProperties::default().with_content_type("application/json".into());
        self.channel
            .basic_publish("", queue, BasicPublishOptions::default(), body, properties)
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;
        Ok(())
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery.tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn reject(&mut self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_reject(delivery.tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.consumer = None;
        if self.channel.status().connected() {
            self.channel.close(REPLY_SUCCESS, "consumer shutdown").await?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "consumer shutdown")
                .await
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
        }
        tracing::info!("Broker connection closed");
        Ok(())
    }
}
