//! Message dispatcher - Routes messages to operations by their `type` tag

use std::sync::Arc;

use super::envelope::Reply;
use super::parser::{Inbound, MessageParser};
use crate::application::services::{PaymentService, RegistrationService};
use crate::domain::entities::MessageType;
use crate::domain::traits::Store;

/// The closed set of operations the router performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    PaymentInit,
    PaymentStatus,
}

/// Inbound tag to operation. Extend the enum and this table together.
const ROUTES: [(MessageType, Operation); 3] = [
    (MessageType::AuthRegister, Operation::Register),
    (MessageType::PaymentInit, Operation::PaymentInit),
    (MessageType::PaymentStatus, Operation::PaymentStatus),
];

impl Operation {
    /// Exact-match lookup; anything else is unroutable
    pub fn resolve(tag: &str) -> Option<Self> {
        ROUTES
            .iter()
            .find(|(kind, _)| kind.as_str() == tag)
            .map(|(_, op)| *op)
    }

    pub fn request_type(&self) -> MessageType {
        match self {
            Operation::Register => MessageType::AuthRegister,
            Operation::PaymentInit => MessageType::PaymentInit,
            Operation::PaymentStatus => MessageType::PaymentStatus,
        }
    }
}

/// What the gateway should do with a delivery
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Publish the reply, then acknowledge
    Reply(Reply),
    /// Nothing to dispatch to; drop the delivery
    Unroutable(String),
}

/// Message dispatcher - parses bodies and hands them to the matching operation
pub struct MessageDispatcher {
    parser: MessageParser,
    registration: RegistrationService,
    payments: PaymentService,
}

impl MessageDispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            parser: MessageParser::new(),
            registration: RegistrationService::new(store.clone()),
            payments: PaymentService::new(store),
        }
    }

    /// Process a raw delivery body
    pub async fn process(&self, body: &[u8]) -> Outcome {
        match self.parser.parse(body) {
            Ok(inbound) => self.dispatch(&inbound).await,
            Err(e) => Outcome::Unroutable(e.to_string()),
        }
    }

    /// Route a parsed message. Unknown tags never reach an operation.
    pub async fn dispatch(&self, inbound: &Inbound) -> Outcome {
        let Some(operation) = Operation::resolve(&inbound.tag) else {
            return Outcome::Unroutable(format!("no handler for type '{}'", inbound.tag));
        };

        tracing::debug!(
            "Dispatching {} (chat {:?}, correlation {:?})",
            inbound.tag,
            inbound.chat_id(),
            inbound.correlation_id()
        );

        let reply = match operation {
            Operation::Register => self.registration.register(&inbound.body).await,
            Operation::PaymentInit => self.payments.init_payment(&inbound.body).await,
            Operation::PaymentStatus => self.payments.update_status(&inbound.body).await,
        };
        Outcome::Reply(reply)
    }
}
