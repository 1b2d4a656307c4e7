use std::sync::Arc;
use serde_json::Value;

use crate::application::errors::OperationError;
use crate::application::messaging::envelope::{
    decode_request, Envelope, ErrorEnvelope, PaymentInitRequest, PaymentStatusRequest, Reply,
    ReportedStatus, StatusAck,
};
use crate::domain::entities::correlation::increment;
use crate::domain::entities::{MessageType, PaidTransition, PaymentDetails};
use crate::domain::traits::Store;

/// Handles `payment.init` and `payment.status` for the chat's open order
pub struct PaymentService {
    store: Arc<dyn Store>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reply with the invoice fields of the chat's open order
    pub async fn init_payment(&self, raw: &Value) -> Reply {
        let request: PaymentInitRequest = match decode_request(raw, MessageType::PaymentInit) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejected payment.init: {}", e);
                return Reply::PaymentFailed(ErrorEnvelope::rejected(
                    MessageType::PaymentInitError,
                    e.to_string(),
                ));
            }
        };

        let correlation_id = increment(Some(&request.correlation_id));
        match self.payment_details(&request.chat_id).await {
            Ok(details) => Reply::PaymentReady(Envelope::new(
                MessageType::PaymentInitResponse,
                request.chat_id,
                correlation_id,
                details,
            )),
            Err(e) => {
                tracing::warn!("payment.init for chat {} failed: {}", request.chat_id, e);
                Reply::PaymentFailed(ErrorEnvelope::failure(
                    MessageType::PaymentInitError,
                    request.chat_id,
                    correlation_id,
                    e.to_string(),
                ))
            }
        }
    }

    /// Apply the payment outcome reported by the bot
    pub async fn update_status(&self, raw: &Value) -> Reply {
        let request: PaymentStatusRequest = match decode_request(raw, MessageType::PaymentStatus) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Rejected payment.status: {}", e);
                return Reply::PaymentFailed(ErrorEnvelope::rejected(
                    MessageType::PaymentStatusError,
                    e.to_string(),
                ));
            }
        };

        let correlation_id = increment(Some(&request.correlation_id));
        match self.apply_status(&request.chat_id, request.data.status).await {
            Ok(()) => Reply::PaymentConfirmed(Envelope::new(
                MessageType::PaymentStatusResponse,
                request.chat_id,
                correlation_id,
                StatusAck::default(),
            )),
            Err(e) => {
                tracing::warn!("payment.status for chat {} failed: {}", request.chat_id, e);
                Reply::PaymentFailed(ErrorEnvelope::failure(
                    MessageType::PaymentStatusError,
                    request.chat_id,
                    correlation_id,
                    e.to_string(),
                ))
            }
        }
    }

    async fn payment_details(&self, chat_id: &str) -> Result<PaymentDetails, OperationError> {
        let order = self
            .store
            .find_open_order(chat_id)
            .await?
            .ok_or_else(|| OperationError::order_not_found(chat_id))?;

        self.store
            .read_payment_fields(&order)
            .await?
            .ok_or(OperationError::PaymentNotFound { order_id: order.id })
    }

    async fn apply_status(&self, chat_id: &str, status: ReportedStatus) -> Result<(), OperationError> {
        let order = self
            .store
            .find_open_order(chat_id)
            .await?
            .ok_or_else(|| OperationError::order_not_found(chat_id))?;

        match status {
            ReportedStatus::Paid => match self.store.set_paid_atomically(&order).await? {
                PaidTransition::Paid => {
                    tracing::info!("Order {} paid", order.id);
                    Ok(())
                }
                PaidTransition::NotFound => Err(OperationError::order_not_found(chat_id)),
            },
            // Reported failures leave the order open so the user can retry
            ReportedStatus::Failed => {
                tracing::info!("Payment failure reported for order {}; order stays open", order.id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Currency, OrderDraft, OrderStatus, PaymentStatus};
    use crate::infrastructure::storage::InMemoryStore;
    use serde_json::json;

    async fn store_with_open_order(chat_id: &str) -> (Arc<InMemoryStore>, String) {
        let store = Arc::new(InMemoryStore::new());
        let (user, _) = store.get_or_create_user("alice").await.unwrap();
        store.get_or_create_profile(chat_id, &user).await.unwrap();
        let draft = OrderDraft::new(Currency::Usd, 25.0).with_name("Mug");
        let (order, _) = store.create_order(&user, &draft).await.unwrap();
        (store, order.id)
    }

    fn status_request(chat_id: &str, status: &str) -> Value {
        json!({
            "type": "payment.status",
            "chat_id": chat_id,
            "correlation_id": "payment.status.3",
            "data": {"status": status}
        })
    }

    #[tokio::test]
    async fn test_init_payment_returns_open_order_details() {
        let (store, _) = store_with_open_order("42").await;
        let service = PaymentService::new(store);

        let reply = service
            .init_payment(&json!({
                "type": "payment.init",
                "chat_id": "42",
                "correlation_id": "payment.init.1"
            }))
            .await;

        let Reply::PaymentReady(envelope) = reply else {
            panic!("expected payment details, got {:?}", reply);
        };
        assert_eq!(envelope.correlation_id, "payment.init.2");
        assert_eq!(envelope.data.currency, Currency::Usd);
        assert_eq!(envelope.data.amount, 25.0);
        assert_eq!(envelope.data.name, "Mug");
        assert_eq!(envelope.data.description, "");
    }

    #[tokio::test]
    async fn test_init_payment_without_open_order_is_not_found() {
        let service = PaymentService::new(Arc::new(InMemoryStore::new()));

        let reply = service
            .init_payment(&json!({
                "type": "payment.init",
                "chat_id": "99",
                "correlation_id": "payment.init.7"
            }))
            .await;

        let Reply::PaymentFailed(envelope) = reply else {
            panic!("expected not found, got {:?}", reply);
        };
        assert_eq!(envelope.kind, MessageType::PaymentInitError);
        assert_eq!(envelope.chat_id, "99");
        assert_eq!(envelope.correlation_id, "payment.init.8");
        assert_eq!(envelope.data.error, "Order is not found by 99.");
    }

    #[tokio::test]
    async fn test_init_payment_schema_violation_uses_placeholders() {
        let service = PaymentService::new(Arc::new(InMemoryStore::new()));

        let reply = service
            .init_payment(&json!({"type": "payment.init", "correlation_id": "payment.init.1"}))
            .await;

        let Reply::PaymentFailed(envelope) = reply else {
            panic!("expected validation error, got {:?}", reply);
        };
        assert_eq!(envelope.chat_id, "None");
        assert_eq!(envelope.correlation_id, "None");
    }

    #[tokio::test]
    async fn test_paid_status_moves_order_and_payment_together() {
        let (store, order_id) = store_with_open_order("42").await;
        let service = PaymentService::new(store.clone());

        let reply = service.update_status(&status_request("42", "PAID")).await;
        let Reply::PaymentConfirmed(envelope) = reply else {
            panic!("expected success, got {:?}", reply);
        };
        assert_eq!(envelope.correlation_id, "payment.status.4");
        assert_eq!(envelope.data.status, "success");

        let order = store.get_order(&order_id).await.unwrap().unwrap();
        let payment = store.get_payment(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(payment.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_paid_status_twice_reports_not_found() {
        let (store, _) = store_with_open_order("42").await;
        let service = PaymentService::new(store);

        assert!(!service.update_status(&status_request("42", "PAID")).await.is_error());
        let again = service.update_status(&status_request("42", "PAID")).await;
        assert!(again.is_error());
        assert_eq!(again.kind(), MessageType::PaymentStatusError);
    }

    #[tokio::test]
    async fn test_failed_status_leaves_order_open() {
        let (store, order_id) = store_with_open_order("42").await;
        let service = PaymentService::new(store.clone());

        let reply = service.update_status(&status_request("42", "FAILED")).await;
        assert_eq!(reply.kind(), MessageType::PaymentStatusResponse);

        let order = store.get_order(&order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_status_without_open_order_is_not_found() {
        let service = PaymentService::new(Arc::new(InMemoryStore::new()));

        let reply = service.update_status(&status_request("5", "PAID")).await;
        let Reply::PaymentFailed(envelope) = reply else {
            panic!("expected not found, got {:?}", reply);
        };
        assert_eq!(envelope.data.error, "Order is not found by 5.");
        assert_eq!(envelope.correlation_id, "payment.status.4");
    }

    #[tokio::test]
    async fn test_status_outside_allowed_set_is_rejected() {
        let (store, _) = store_with_open_order("42").await;
        let service = PaymentService::new(store);

        let reply = service.update_status(&status_request("42", "REFUNDED")).await;
        assert_eq!(reply.kind(), MessageType::PaymentStatusError);
        assert_eq!(reply.correlation_id(), "None");
    }
}
