//! Application services - Domain operations and the consumer loop

pub mod consumer_service;
pub mod payment_service;
pub mod registration_service;

pub use consumer_service::{ConsumerService, ConsumerStats, Handled, QueueRoutes};
pub use payment_service::PaymentService;
pub use registration_service::RegistrationService;
