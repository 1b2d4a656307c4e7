use std::sync::Arc;
use serde_json::Value;

use crate::application::errors::OperationError;
use crate::application::messaging::envelope::{
    decode_request, Envelope, RegisterRequest, RegistrationFailure, RegistrationOutcome, Reply,
    REGISTER_SENTINEL_ID,
};
use crate::domain::entities::correlation::{increment, try_increment};
use crate::domain::entities::MessageType;
use crate::domain::traits::Store;

/// Handles `auth.register`.
///
/// Registration is idempotent per (username, chat_id): users and profiles
/// are fetched or created, never duplicated, and the reply flags say whether
/// this call did the creating.
pub struct RegistrationService {
    store: Arc<dyn Store>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn register(&self, raw: &Value) -> Reply {
        match self.try_register(raw).await {
            Ok(envelope) => Reply::Registered(envelope),
            Err(e) => {
                tracing::warn!("Registration failed: {}", e);
                Reply::RegistrationFailed(Self::failure(raw, &e))
            }
        }
    }

    async fn try_register(&self, raw: &Value) -> Result<Envelope<RegistrationOutcome>, OperationError> {
        let request: RegisterRequest = decode_request(raw, MessageType::AuthRegister)?;
        if request.data.username.is_empty() || request.chat_id.is_empty() {
            return Err(OperationError::validation("username and chat_id are required"));
        }

        let (user, user_created) = self.store.get_or_create_user(&request.data.username).await?;
        let (profile, profile_created) = self
            .store
            .get_or_create_profile(&request.chat_id, &user)
            .await?;

        tracing::debug!(
            "Registered {} in chat {} (user_created={}, profile_created={})",
            user, profile.chat_id, user_created, profile_created
        );

        let correlation_id = increment(Some(&request.correlation_id));
        Ok(Envelope::new(
            MessageType::AuthRegisterResponse,
            request.chat_id,
            correlation_id,
            RegistrationOutcome {
                user_created,
                profile_created,
            },
        ))
    }

    /// Best-effort identity for the error reply: the inbound id incremented
    /// when possible, otherwise as received, otherwise the sentinel.
    fn failure(raw: &Value, err: &OperationError) -> RegistrationFailure {
        let chat_id = raw
            .get("chat_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let correlation_id = match raw.get("correlation_id").and_then(Value::as_str) {
            Some(id) => try_increment(id).unwrap_or_else(|_| id.to_string()),
            None => REGISTER_SENTINEL_ID.to_string(),
        };

        RegistrationFailure::new(chat_id, correlation_id, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStore;
    use serde_json::json;

    fn service() -> (RegistrationService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (RegistrationService::new(store.clone()), store)
    }

    fn request(username: &str, chat_id: &str, correlation_id: &str) -> Value {
        json!({
            "type": "auth.register",
            "chat_id": chat_id,
            "correlation_id": correlation_id,
            "data": {"username": username}
        })
    }

    #[tokio::test]
    async fn test_register_twice_is_idempotent() {
        let (service, store) = service();

        let first = service.register(&request("alice", "42", "auth.register.1")).await;
        let Reply::Registered(first) = first else {
            panic!("expected success, got {:?}", first);
        };
        assert!(first.data.user_created);
        assert!(first.data.profile_created);
        assert_eq!(first.correlation_id, "auth.register.2");
        assert_eq!(first.kind, MessageType::AuthRegisterResponse);

        let second = service.register(&request("alice", "42", "auth.register.5")).await;
        let Reply::Registered(second) = second else {
            panic!("expected success, got {:?}", second);
        };
        assert!(!second.data.user_created);
        assert!(!second.data.profile_created);
        assert_eq!(second.correlation_id, "auth.register.6");

        assert_eq!(store.find_profiles("42").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_requires_username() {
        let (service, _) = service();

        let reply = service.register(&request("", "42", "auth.register.1")).await;
        let Reply::RegistrationFailed(failure) = reply else {
            panic!("expected failure, got {:?}", reply);
        };
        assert_eq!(failure.kind, MessageType::AuthRegisterError);
        assert_eq!(failure.error, "username and chat_id are required");
        assert_eq!(failure.correlation_id, "auth.register.2");
        assert_eq!(failure.chat_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_register_failure_keeps_unparsable_correlation_id() {
        let (service, _) = service();

        let reply = service.register(&request("", "42", "broken")).await;
        assert_eq!(reply.correlation_id(), "broken");
    }

    #[tokio::test]
    async fn test_register_failure_without_correlation_id_uses_sentinel() {
        let (service, _) = service();

        let reply = service.register(&json!({"type": "auth.register"})).await;
        assert!(reply.is_error());
        assert_eq!(reply.correlation_id(), REGISTER_SENTINEL_ID);
    }

    #[tokio::test]
    async fn test_register_success_with_malformed_correlation_id_reports_it() {
        let (service, _) = service();

        let reply = service.register(&request("bob", "7", "auth.register")).await;
        assert!(!reply.is_error());
        assert_eq!(reply.correlation_id(), "Invalid correlation id: auth.register");
    }
}
