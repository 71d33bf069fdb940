//! Persistence implementations

pub mod contacts;
pub mod history_repository;

pub use contacts::MemoryContactDirectory;
pub use history_repository::MemoryHistoryRepository;
