//! Domain entities - Core business objects with no external dependencies

pub mod correlation;
pub mod message;
pub mod order;
pub mod user;

pub use correlation::{CorrelationError, CorrelationId};
pub use message::{MessageType, ResponseFamily};
pub use order::{
    Currency, Order, OrderDraft, OrderStatus, PaidTransition, Payment, PaymentDetails,
    PaymentStatus,
};
pub use user::{Profile, User};
