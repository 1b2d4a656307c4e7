//! Domain layer - Core business types
//!
//! This layer contains:
//! - Entities: Users, profiles, orders, payments, wire tags, correlation ids
//! - Traits: Abstractions for infrastructure (Store, Broker)

pub mod entities;
pub mod traits;
