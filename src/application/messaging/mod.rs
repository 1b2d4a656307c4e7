//! Message handling - Envelopes, parsing and dispatch

pub mod dispatcher;
pub mod envelope;
pub mod parser;

pub use dispatcher::{MessageDispatcher, Operation, Outcome};
pub use envelope::{Envelope, ErrorEnvelope, Reply};
pub use parser::{Inbound, MessageParser};
