use async_trait::async_trait;
use crate::application::errors::StorageError;
use crate::domain::entities::{
    Order, OrderDraft, PaidTransition, Payment, PaymentDetails, Profile, User,
};

/// Store trait - the repository the domain operations run against.
///
/// Implementations own their concurrency control: get-or-create must be
/// safe when several consumer processes race on the same key, and
/// `set_paid_atomically` must never expose the order and payment updates
/// independently.
#[async_trait]
pub trait Store: Send + Sync {
    // Accounts
    async fn get_or_create_user(&self, username: &str) -> Result<(User, bool), StorageError>;
    async fn get_or_create_profile(&self, chat_id: &str, user: &User) -> Result<(Profile, bool), StorageError>;
    async fn find_profiles(&self, chat_id: &str) -> Result<Vec<Profile>, StorageError>;

    // Orders and payments
    async fn find_open_order(&self, chat_id: &str) -> Result<Option<Order>, StorageError>;
    async fn read_payment_fields(&self, order: &Order) -> Result<Option<PaymentDetails>, StorageError>;
    async fn set_paid_atomically(&self, order: &Order) -> Result<PaidTransition, StorageError>;

    /// Open an order in `CREATED` status together with its payment
    async fn create_order(&self, user: &User, draft: &OrderDraft) -> Result<(Order, Payment), StorageError>;
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, StorageError>;
    async fn get_payment(&self, order_id: &str) -> Result<Option<Payment>, StorageError>;
}
