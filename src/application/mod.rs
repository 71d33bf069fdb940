//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Serialising daemon callbacks and service commands onto one worker
//! - Applying them to the conference registry
//! - Publishing service events and counters

pub mod call_manager;
pub mod callback;
pub mod command;
pub mod events;
pub mod sip_service;
pub mod stats;

pub use call_manager::CallManager;
pub use callback::DaemonCallback;
pub use events::{EventBroadcaster, ServiceEvent};
pub use sip_service::SipService;
pub use stats::ServiceStats;
