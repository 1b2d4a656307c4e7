//! Wire envelopes - request schemas and the response variants each operation can produce

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::errors::OperationError;
use crate::domain::entities::{MessageType, PaymentDetails, ResponseFamily};

/// Identity used when a request is too malformed to trust its own
/// `chat_id` or `correlation_id`
pub const PLACEHOLDER_ID: &str = "None";

/// Correlation id sent back when a failed registration carried none
pub const REGISTER_SENTINEL_ID: &str = "auth.register.N";

/// `{type, chat_id, correlation_id, data}` - the unit exchanged over the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub chat_id: String,
    pub correlation_id: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(
        kind: MessageType,
        chat_id: impl Into<String>,
        correlation_id: impl Into<String>,
        data: T,
    ) -> Self {
        Self {
            kind,
            chat_id: chat_id.into(),
            correlation_id: correlation_id.into(),
            data,
        }
    }
}

pub type ErrorEnvelope = Envelope<ErrorData>;

impl ErrorEnvelope {
    pub fn failure(
        kind: MessageType,
        chat_id: impl Into<String>,
        correlation_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(kind, chat_id, correlation_id, ErrorData { error: error.into() })
    }

    /// Error variant for a request that failed schema validation
    pub fn rejected(kind: MessageType, error: impl Into<String>) -> Self {
        Self::failure(kind, PLACEHOLDER_ID, PLACEHOLDER_ID, error)
    }
}

/// Anything carrying a `type` discriminant that must match the operation
pub trait Tagged {
    fn kind(&self) -> MessageType;
}

impl<T> Tagged for Envelope<T> {
    fn kind(&self) -> MessageType {
        self.kind
    }
}

// Requests

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterData {
    pub username: String,
}

pub type RegisterRequest = Envelope<RegisterData>;

/// `payment.init` needs nothing beyond the chat it comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitRequest {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub chat_id: String,
    pub correlation_id: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Tagged for PaymentInitRequest {
    fn kind(&self) -> MessageType {
        self.kind
    }
}

/// Payment outcome reported by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportedStatus {
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "FAILED")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatusData {
    pub status: ReportedStatus,
}

pub type PaymentStatusRequest = Envelope<PaymentStatusData>;

/// Decode a request and check its `type` literal
pub fn decode_request<R>(raw: &Value, expected: MessageType) -> Result<R, OperationError>
where
    R: DeserializeOwned + Tagged,
{
    let request: R = serde_json::from_value(raw.clone())
        .map_err(|e| OperationError::validation(format!("invalid {} request: {}", expected, e)))?;

    if request.kind() != expected {
        return Err(OperationError::validation(format!(
            "type must be '{}', got '{}'",
            expected,
            request.kind()
        )));
    }
    Ok(request)
}

// Responses

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub user_created: bool,
    pub profile_created: bool,
}

/// Registration errors carry `error` at the top level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationFailure {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub correlation_id: String,
    pub error: String,
}

impl RegistrationFailure {
    pub fn new(chat_id: Option<String>, correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: MessageType::AuthRegisterError,
            chat_id,
            correlation_id: correlation_id.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusAck {
    pub status: String,
}

impl Default for StatusAck {
    fn default() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub error: String,
}

/// Every envelope an operation can hand back to the gateway.
/// Success and failure are published the same way.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Registered(Envelope<RegistrationOutcome>),
    RegistrationFailed(RegistrationFailure),
    PaymentReady(Envelope<PaymentDetails>),
    PaymentConfirmed(Envelope<StatusAck>),
    PaymentFailed(ErrorEnvelope),
}

impl Reply {
    pub fn kind(&self) -> MessageType {
        match self {
            Reply::Registered(e) => e.kind,
            Reply::RegistrationFailed(f) => f.kind,
            Reply::PaymentReady(e) => e.kind,
            Reply::PaymentConfirmed(e) => e.kind,
            Reply::PaymentFailed(e) => e.kind,
        }
    }

    pub fn family(&self) -> ResponseFamily {
        self.kind().family()
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Reply::Registered(e) => &e.correlation_id,
            Reply::RegistrationFailed(f) => &f.correlation_id,
            Reply::PaymentReady(e) => &e.correlation_id,
            Reply::PaymentConfirmed(e) => &e.correlation_id,
            Reply::PaymentFailed(e) => &e.correlation_id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind().is_error()
    }

    /// Serialize as a single JSON body
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Currency;
    use serde_json::json;

    #[test]
    fn test_decode_register_request() {
        let raw = json!({
            "type": "auth.register",
            "chat_id": "42",
            "correlation_id": "auth.register.1",
            "data": {"username": "alice"},
            "timestamp": "2025-01-01T12:00:00Z"
        });

        let request: RegisterRequest = decode_request(&raw, MessageType::AuthRegister).unwrap();
        assert_eq!(request.chat_id, "42");
        assert_eq!(request.data.username, "alice");
    }

    #[test]
    fn test_decode_rejects_wrong_type_literal() {
        let raw = json!({
            "type": "payment.status",
            "chat_id": "42",
            "correlation_id": "payment.init.1"
        });

        let err = decode_request::<PaymentInitRequest>(&raw, MessageType::PaymentInit).unwrap_err();
        assert!(matches!(err, OperationError::Validation(_)));
        assert!(err.to_string().contains("payment.init"));
    }

    #[test]
    fn test_decode_payment_init_without_data() {
        let raw = json!({
            "type": "payment.init",
            "chat_id": "42",
            "correlation_id": "payment.init.1"
        });

        let request: PaymentInitRequest = decode_request(&raw, MessageType::PaymentInit).unwrap();
        assert!(request.data.is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_payment_status() {
        let raw = json!({
            "type": "payment.status",
            "chat_id": "42",
            "correlation_id": "payment.status.1",
            "data": {"status": "REFUNDED"}
        });

        let result = decode_request::<PaymentStatusRequest>(&raw, MessageType::PaymentStatus);
        assert!(matches!(result, Err(OperationError::Validation(_))));
    }

    #[test]
    fn test_decode_rejects_ill_typed_chat_id() {
        let raw = json!({
            "type": "payment.init",
            "chat_id": 42,
            "correlation_id": "payment.init.1"
        });

        let result = decode_request::<PaymentInitRequest>(&raw, MessageType::PaymentInit);
        assert!(matches!(result, Err(OperationError::Validation(_))));
    }

    #[test]
    fn test_registration_failure_has_top_level_error() {
        let reply = Reply::RegistrationFailed(RegistrationFailure::new(
            None,
            REGISTER_SENTINEL_ID,
            "username and chat_id are required",
        ));

        let value: Value = serde_json::from_slice(&reply.to_bytes().unwrap()).unwrap();
        assert_eq!(value["type"], "auth.register.error");
        assert_eq!(value["correlation_id"], "auth.register.N");
        assert_eq!(value["error"], "username and chat_id are required");
        assert!(value.get("chat_id").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_rejected_uses_placeholder_identity() {
        let reply = Reply::PaymentFailed(ErrorEnvelope::rejected(MessageType::PaymentStatusError, "bad"));

        let value: Value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["chat_id"], "None");
        assert_eq!(value["correlation_id"], "None");
        assert_eq!(value["data"]["error"], "bad");
        assert_eq!(reply.family(), ResponseFamily::Payment);
        assert!(reply.is_error());
    }

    #[test]
    fn test_payment_ready_serializes_details() {
        let details = PaymentDetails {
            currency: Currency::Eur,
            amount: 19.99,
            name: "Notebook".to_string(),
            description: String::new(),
        };
        let reply = Reply::PaymentReady(Envelope::new(
            MessageType::PaymentInitResponse,
            "42",
            "payment.init.2",
            details,
        ));

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "payment.init.response",
                "chat_id": "42",
                "correlation_id": "payment.init.2",
                "data": {
                    "currency": "EUR",
                    "amount": 19.99,
                    "name": "Notebook",
                    "description": ""
                }
            })
        );
    }
}
