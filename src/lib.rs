//! Ringcore - call and conference state for a SIP client
//!
//! Keeps the client's view of calls and conferences consistent with the
//! native daemon that actually runs them. Daemon callbacks and user
//! commands are applied one at a time by a single worker.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{DaemonCallback, ServiceEvent, SipService};
pub use domain::shared::error::{DomainError, Result};
