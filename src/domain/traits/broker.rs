use async_trait::async_trait;
use crate::application::errors::BrokerError;

/// A message pulled from a queue, pending acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            body: body.into(),
            redelivered: false,
        }
    }
}

/// Broker trait - abstraction over the message broker connection.
///
/// One value owns one connection and one channel for the process lifetime.
#[async_trait]
pub trait Broker: Send {
    /// Declare a queue, creating it if missing
    async fn declare_queue(&mut self, queue: &str) -> Result<(), BrokerError>;

    /// Start consuming a queue; deliveries come from `next_delivery`
    async fn consume(&mut self, queue: &str) -> Result<(), BrokerError>;

    /// Wait for the next delivery. `None` means the consumer was cancelled
    /// or the connection closed.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, BrokerError>;

    /// Publish one body to a queue through the default exchange
    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError>;

    /// Serialize a JSON payload and publish it as a single body
    async fn publish_json(&mut self, queue: &str, payload: &serde_json::Value) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(payload).map_err(|e| BrokerError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        })?;
        self.publish(queue, &body).await
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;

    async fn reject(&mut self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError>;

    /// Close the channel and the connection
    async fn close(&mut self) -> Result<(), BrokerError>;
}
