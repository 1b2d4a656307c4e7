use std::future::Future;

use crate::application::errors::BrokerError;
use crate::application::messaging::dispatcher::{MessageDispatcher, Outcome};
use crate::domain::entities::{MessageType, ResponseFamily};
use crate::domain::traits::{Broker, Delivery};

/// Queue names one consumer works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRoutes {
    pub inbound: String,
    pub auth_outbound: String,
    pub payment_outbound: String,
}

impl QueueRoutes {
    pub fn outbound(&self, family: ResponseFamily) -> &str {
        match family {
            ResponseFamily::Auth => &self.auth_outbound,
            ResponseFamily::Payment => &self.payment_outbound,
        }
    }
}

/// How a single delivery ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Replied(MessageType),
    Rejected,
}

/// Counters reported when the consumer stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub replied: u64,
    pub errors_replied: u64,
    pub rejected: u64,
}

/// Broker gateway loop.
///
/// Deliveries are processed strictly one at a time: the reply is published
/// and the delivery acknowledged before the next one is pulled. The ack
/// happens only after a successful publish, so a crash in between leads to
/// redelivery and the operation running again.
pub struct ConsumerService<B: Broker> {
    broker: B,
    dispatcher: MessageDispatcher,
    routes: QueueRoutes,
}

impl<B: Broker> ConsumerService<B> {
    pub fn new(broker: B, dispatcher: MessageDispatcher, routes: QueueRoutes) -> Self {
        Self {
            broker,
            dispatcher,
            routes,
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn routes(&self) -> &QueueRoutes {
        &self.routes
    }

    /// Declare every queue this consumer touches and start consuming
    pub async fn start(&mut self) -> Result<(), BrokerError> {
        for queue in [
            &self.routes.inbound,
            &self.routes.auth_outbound,
            &self.routes.payment_outbound,
        ] {
            self.broker.declare_queue(queue).await?;
        }
        self.broker.consume(&self.routes.inbound).await?;
        tracing::info!("Consuming queue '{}'", self.routes.inbound);
        Ok(())
    }

    /// Consume until `shutdown` resolves or the broker stops delivering,
    /// then close the connection. A delivery already pulled is always
    /// finished before shutdown takes effect.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<ConsumerStats, BrokerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = ConsumerStats::default();

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break Ok(());
                }
                next = self.broker.next_delivery() => next,
            };

            let delivery = match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::info!("Consumer stream ended");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            match self.handle_delivery(&delivery).await {
                Ok(Handled::Replied(kind)) => {
                    stats.replied += 1;
                    if kind.is_error() {
                        stats.errors_replied += 1;
                    }
                }
                Ok(Handled::Rejected) => stats.rejected += 1,
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            tracing::error!("Consumer stopped on broker error: {}", e);
        }
        self.broker.close().await?;
        tracing::info!(
            "Consumer closed: {} replied ({} errors), {} rejected",
            stats.replied,
            stats.errors_replied,
            stats.rejected
        );

        result.map(|_| stats)
    }

    /// Dispatch one delivery, publish the reply and acknowledge
    pub async fn handle_delivery(&mut self, delivery: &Delivery) -> Result<Handled, BrokerError> {
        match self.dispatcher.process(&delivery.body).await {
            Outcome::Reply(reply) => {
                let queue = self.routes.outbound(reply.family()).to_string();
                let body = reply.to_bytes().map_err(|e| BrokerError::Publish {
                    queue: queue.clone(),
                    reason: e.to_string(),
                })?;

                self.broker.publish(&queue, &body).await?;
                self.broker.ack(delivery).await?;

                tracing::info!(
                    "Delivery {} -> {} on '{}' ({})",
                    delivery.tag,
                    reply.kind(),
                    queue,
                    reply.correlation_id()
                );
                Ok(Handled::Replied(reply.kind()))
            }
            Outcome::Unroutable(reason) => {
                tracing::warn!("Dropping delivery {}: {}", delivery.tag, reason);
                self.broker.reject(delivery, false).await?;
                Ok(Handled::Rejected)
            }
        }
    }
}
