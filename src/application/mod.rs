//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: The domain operations and the broker consumer loop
//! - Errors: Typed errors for every layer
//! - Messaging: Envelope schemas, parsing, dispatching

pub mod errors;
pub mod messaging;
pub mod services;
