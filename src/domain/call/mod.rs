//! Call bounded context - a single leg and its state machine

pub mod aggregate;
pub mod entity;
pub mod security;
pub mod value_object;

pub use aggregate::{Call, StateTransition};
pub use entity::{CallContact, ContactDirectory};
pub use security::{NegotiationFailure, SecureChannel};
pub use value_object::{CallDirection, CallState};
