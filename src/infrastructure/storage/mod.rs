//! In-memory storage implementation

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::entities::{
    Order, OrderDraft, OrderStatus, PaidTransition, Payment, PaymentDetails, PaymentStatus,
    Profile, User,
};
use crate::domain::traits::Store;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    profiles: HashMap<i64, Profile>,
    orders: HashMap<String, Order>,
    payments: HashMap<String, Payment>,
    next_user_id: i64,
}

impl Tables {
    fn user_ids_for_chat(&self, chat_id: &str) -> Vec<i64> {
        self.profiles
            .values()
            .filter(|p| p.chat_id == chat_id)
            .map(|p| p.user_id)
            .collect()
    }
}

/// Store held in process memory. All tables sit behind one lock, so every
/// trait call is atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_or_create_user(&self, username: &str) -> Result<(User, bool), StorageError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.get(username) {
            return Ok((user.clone(), false));
        }

        tables.next_user_id += 1;
        let user = User::new(tables.next_user_id, username);
        tables.users.insert(username.to_string(), user.clone());
        Ok((user, true))
    }

    async fn get_or_create_profile(&self, chat_id: &str, user: &User) -> Result<(Profile, bool), StorageError> {
        let mut tables = self.tables.write().await;
        match tables.profiles.get(&user.id) {
            Some(profile) if profile.chat_id == chat_id => Ok((profile.clone(), false)),
            Some(_) => Err(StorageError::Conflict(format!(
                "user '{}' is already linked to another chat",
                user.username
            ))),
            None => {
                let profile = Profile::new(chat_id, user);
                tables.profiles.insert(user.id, profile.clone());
                Ok((profile, true))
            }
        }
    }

    async fn find_profiles(&self, chat_id: &str) -> Result<Vec<Profile>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .values()
            .filter(|p| p.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn find_open_order(&self, chat_id: &str) -> Result<Option<Order>, StorageError> {
        let tables = self.tables.read().await;
        let user_ids = tables.user_ids_for_chat(chat_id);
        Ok(tables
            .orders
            .values()
            .filter(|o| o.is_open() && user_ids.contains(&o.user_id))
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn read_payment_fields(&self, order: &Order) -> Result<Option<PaymentDetails>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&order.id).map(Payment::details))
    }

    async fn set_paid_atomically(&self, order: &Order) -> Result<PaidTransition, StorageError> {
        let mut tables = self.tables.write().await;
        let open = tables.orders.get(&order.id).is_some_and(Order::is_open);
        if !open || !tables.payments.contains_key(&order.id) {
            return Ok(PaidTransition::NotFound);
        }

        if let Some(stored) = tables.orders.get_mut(&order.id) {
            stored.status = OrderStatus::Paid;
        }
        if let Some(payment) = tables.payments.get_mut(&order.id) {
            payment.status = PaymentStatus::Paid;
        }
        Ok(PaidTransition::Paid)
    }

    async fn create_order(&self, user: &User, draft: &OrderDraft) -> Result<(Order, Payment), StorageError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            status: OrderStatus::Created,
            sender_service: draft.sender_service.clone(),
            created_at: now,
        };
        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            status: PaymentStatus::Created,
            currency: draft.currency,
            amount: draft.amount,
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_at: now,
        };

        tables.orders.insert(order.id.clone(), order.clone());
        tables.payments.insert(order.id.clone(), payment.clone());
        Ok((order, payment))
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn get_payment(&self, order_id: &str) -> Result<Option<Payment>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(order_id).cloned())
    }
}
