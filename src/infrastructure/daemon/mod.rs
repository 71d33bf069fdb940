//! Daemon adapters

pub mod memory;

pub use memory::MemoryDaemon;
