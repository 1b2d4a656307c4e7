//! Broker adapters

pub mod amqp;
pub mod memory;

pub use amqp::AmqpBroker;
pub use memory::InMemoryBroker;
