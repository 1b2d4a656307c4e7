//! In-process broker for development and tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::application::errors::BrokerError;
use crate::domain::traits::{Broker, Delivery};

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    declared: HashSet<String>,
    failing: HashSet<String>,
    unacked: HashMap<u64, (String, Vec<u8>)>,
    acked: Vec<u64>,
    rejected: Vec<(u64, bool)>,
    events: Vec<String>,
    next_tag: u64,
    closed: bool,
}

/// Queue broker held in memory. Clones share the same queues, so a test can
/// keep a handle while the consumer owns another.
///
/// `next_delivery` returns `None` once the consumed queue is empty.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    consuming: Option<String>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `queue` fail
    pub fn with_failing_queue(self, queue: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(queue.into());
        }
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Channel("broker state lock poisoned".to_string()))
    }

    /// Put a raw body on a queue as a producer would
    pub fn enqueue(&self, queue: &str, body: &[u8]) {
        if let Ok(mut state) = self.state.lock() {
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(body.to_vec());
        }
    }

    /// Bodies currently waiting on a queue
    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .map(|state| {
                state
                    .queues
                    .get(queue)
                    .map(|q| q.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.published(queue).len()
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.state
            .lock()
            .map(|state| state.declared.contains(queue))
            .unwrap_or(false)
    }

    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().map(|s| s.acked.clone()).unwrap_or_default()
    }

    pub fn rejected(&self) -> Vec<(u64, bool)> {
        self.state.lock().map(|s| s.rejected.clone()).unwrap_or_default()
    }

    /// Publish, ack, reject and close calls in the order they happened
    pub fn events(&self) -> Vec<String> {
        self.state.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(false)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&mut self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        state.declared.insert(queue.to_string());
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn consume(&mut self, queue: &str) -> Result<(), BrokerError> {
        if !self.lock()?.declared.contains(queue) {
            return Err(BrokerError::Channel(format!("queue '{}' not declared", queue)));
        }
        self.consuming = Some(queue.to_string());
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Option<Delivery>, BrokerError> {
        let queue = self.consuming.clone().ok_or(BrokerError::NotConsuming)?;
        let mut state = self.lock()?;
        if state.closed {
            return Ok(None);
        }

        let Some(body) = state.queues.get_mut(&queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        state.next_tag += 1;
        let tag = state.next_tag;
        state.unacked.insert(tag, (queue, body.clone()));
        Ok(Some(Delivery::new(tag, body)))
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        if state.failing.contains(queue) {
            return Err(BrokerError::Publish {
                queue: queue.to_string(),
                reason: "queue unavailable".to_string(),
            });
        }
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(body.to_vec());
        state.events.push(format!("publish {}", queue));
        Ok(())
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        state
            .unacked
            .remove(&delivery.tag)
            .ok_or_else(|| BrokerError::Ack(format!("unknown delivery tag {}", delivery.tag)))?;
        state.acked.push(delivery.tag);
        state.events.push(format!("ack {}", delivery.tag));
        Ok(())
    }

    async fn reject(&mut self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        let (queue, body) = state
            .unacked
            .remove(&delivery.tag)
            .ok_or_else(|| BrokerError::Ack(format!("unknown delivery tag {}", delivery.tag)))?;
        if requeue {
            state.queues.entry(queue).or_default().push_front(body);
        }
        state.rejected.push((delivery.tag, requeue));
        state.events.push(format!("reject {}", delivery.tag));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        // Unacknowledged deliveries go back to their queue, as on a real broker
        let unacked: Vec<(u64, (String, Vec<u8>))> = state.unacked.drain().collect();
        for (_, (queue, body)) in unacked {
            state.queues.entry(queue).or_default().push_front(body);
        }
        state.closed = true;
        state.events.push("close".to_string());
        Ok(())
    }
}
