use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire `type` tag of every envelope the router reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "auth.register")]
    AuthRegister,
    #[serde(rename = "auth.register.response")]
    AuthRegisterResponse,
    #[serde(rename = "auth.register.error")]
    AuthRegisterError,
    #[serde(rename = "payment.init")]
    PaymentInit,
    #[serde(rename = "payment.init.response")]
    PaymentInitResponse,
    #[serde(rename = "payment.init.response.error")]
    PaymentInitError,
    #[serde(rename = "payment.status")]
    PaymentStatus,
    #[serde(rename = "payment.status.response")]
    PaymentStatusResponse,
    #[serde(rename = "payment.status.response.error")]
    PaymentStatusError,
}

impl MessageType {
    pub const ALL: [MessageType; 9] = [
        MessageType::AuthRegister,
        MessageType::AuthRegisterResponse,
        MessageType::AuthRegisterError,
        MessageType::PaymentInit,
        MessageType::PaymentInitResponse,
        MessageType::PaymentInitError,
        MessageType::PaymentStatus,
        MessageType::PaymentStatusResponse,
        MessageType::PaymentStatusError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AuthRegister => "auth.register",
            MessageType::AuthRegisterResponse => "auth.register.response",
            MessageType::AuthRegisterError => "auth.register.error",
            MessageType::PaymentInit => "payment.init",
            MessageType::PaymentInitResponse => "payment.init.response",
            MessageType::PaymentInitError => "payment.init.response.error",
            MessageType::PaymentStatus => "payment.status",
            MessageType::PaymentStatusResponse => "payment.status.response",
            MessageType::PaymentStatusError => "payment.status.response.error",
        }
    }

    /// Exact-match lookup of a wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Inbound requests are the only tags the router dispatches
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            MessageType::AuthRegister | MessageType::PaymentInit | MessageType::PaymentStatus
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MessageType::AuthRegisterError
                | MessageType::PaymentInitError
                | MessageType::PaymentStatusError
        )
    }

    pub fn family(&self) -> ResponseFamily {
        match self {
            MessageType::AuthRegister
            | MessageType::AuthRegisterResponse
            | MessageType::AuthRegisterError => ResponseFamily::Auth,
            _ => ResponseFamily::Payment,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound queue group a response belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseFamily {
    Auth,
    Payment,
}

impl ResponseFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFamily::Auth => "auth",
            ResponseFamily::Payment => "payment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag_matches_exactly() {
        assert_eq!(MessageType::from_tag("payment.init"), Some(MessageType::PaymentInit));
        assert_eq!(MessageType::from_tag("payment.initial"), None);
        assert_eq!(MessageType::from_tag("Payment.Init"), None);
    }

    #[test]
    fn test_serde_uses_wire_tags() {
        for tag in MessageType::ALL {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.as_str()));
        }
    }

    #[test]
    fn test_family_groups_auth_and_payment() {
        assert_eq!(MessageType::AuthRegisterError.family(), ResponseFamily::Auth);
        assert_eq!(MessageType::PaymentStatusResponse.family(), ResponseFamily::Payment);
        assert!(MessageType::PaymentInitError.is_error());
        assert!(!MessageType::PaymentInitResponse.is_request());
    }
}
