//! Application layer errors

use thiserror::Error;

/// Top-level router errors
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broker transport errors. Always fatal to the consumer.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Publish to '{queue}' failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Acknowledgement failed: {0}")]
    Ack(String),

    #[error("Consumer not started")]
    NotConsuming,
}

impl From<lapin::Error> for BrokerError {
    fn from(e: lapin::Error) -> Self {
        BrokerError::Channel(e.to_string())
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Raw delivery bodies the router cannot route at all
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Body is not valid JSON: {0}")]
    NotJson(String),

    #[error("Body is not a JSON object")]
    NotObject,

    #[error("Missing or non-string 'type' field")]
    MissingType,
}

/// Failures inside a domain operation. Each is turned into an error envelope
/// at the operation boundary and never reaches the gateway.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("{0}")]
    Validation(String),

    #[error("Order is not found by {chat_id}.")]
    OrderNotFound { chat_id: String },

    #[error("Payment is not found for order {order_id}.")]
    PaymentNotFound { order_id: String },

    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl OperationError {
    pub fn validation(reason: impl Into<String>) -> Self {
        OperationError::Validation(reason.into())
    }

    pub fn order_not_found(chat_id: impl Into<String>) -> Self {
        OperationError::OrderNotFound { chat_id: chat_id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_not_found_message() {
        let err = OperationError::order_not_found("42");
        assert_eq!(err.to_string(), "Order is not found by 42.");
    }

    #[test]
    fn test_storage_error_converts_into_router_error() {
        let err: RouterError = StorageError::LockPoisoned.into();
        assert!(matches!(err, RouterError::Storage(StorageError::LockPoisoned)));
    }
}
