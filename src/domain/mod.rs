//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Aggregates: calls and the conferences that own them
//! - The conference registry and its reconciliation rules
//! - Ports: the native daemon and the history recorder

pub mod call;
pub mod conference;
pub mod daemon;
pub mod history;
pub mod registry;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
