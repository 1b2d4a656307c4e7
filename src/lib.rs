//! shop-router - routes chat-bot intents from a message broker to the shop store

pub mod application;
pub mod domain;
pub mod infrastructure;
