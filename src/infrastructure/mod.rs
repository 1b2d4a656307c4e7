//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Database: SQLite persistence
//! - Storage: In-memory persistence
//! - Broker: AMQP and in-memory broker adapters

pub mod broker;
pub mod config;
pub mod database;
pub mod storage;
