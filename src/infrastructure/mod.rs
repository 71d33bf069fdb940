//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Daemon adapters
//! - History and contact stores

pub mod daemon;
pub mod persistence;
