//! Domain traits - Abstractions for infrastructure implementations

pub mod broker;
pub mod store;

pub use broker::{Broker, Delivery};
pub use store::Store;
