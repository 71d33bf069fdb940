//! In-memory call history store

use crate::domain::history::{HistoryEntry, HistoryRecorder};
use crate::domain::shared::error::{DomainError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MemoryHistoryRepository {
    entries: Arc<RwLock<VecDeque<HistoryEntry>>>,
    max_entries: usize,
    /// Reject writes, to exercise failure handling
    failing: AtomicBool,
}

impl MemoryHistoryRepository {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl HistoryRecorder for MemoryHistoryRepository {
    async fn insert_new_entry(&self, entry: &HistoryEntry) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence("history store unavailable".to_string()));
        }

        let mut entries = self.entries.write().await;
        entries.push_back(entry.clone());

        // Maintain max size (FIFO)
        while entries.len() > self.max_entries {
            entries.pop_front();
        }

        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::{Call, CallContact, CallState};
    use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};

    fn entry(id: &str) -> HistoryEntry {
        let mut call = Call::incoming(CallId::new(id), AccountId::new("acct1"), CallContact::unknown("bob"));
        call.apply_state(CallState::Hungup);
        HistoryEntry::from_call(&call, &ConferenceId::new(id))
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = MemoryHistoryRepository::new(10);
        repo.insert_new_entry(&entry("call-1")).await.unwrap();
        repo.insert_new_entry(&entry("call-2")).await.unwrap();

        let listed = repo.list(10).await.unwrap();
        assert_eq!(listed[0].call_id.as_str(), "call-2");
        assert_eq!(listed[1].call_id.as_str(), "call-1");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let repo = MemoryHistoryRepository::new(2);
        for id in ["call-1", "call-2", "call-3"] {
            repo.insert_new_entry(&entry(id)).await.unwrap();
        }

        assert_eq!(repo.len().await, 2);
        let listed = repo.list(1).await.unwrap();
        assert_eq!(listed[0].call_id.as_str(), "call-3");
    }

    #[tokio::test]
    async fn test_failing_store_reports_error() {
        let repo = MemoryHistoryRepository::new(2);
        repo.set_failing(true);

        let err = repo.insert_new_entry(&entry("call-1")).await.unwrap_err();
        assert!(matches!(err, DomainError::Persistence(_)));
        assert!(repo.is_empty().await);
    }
}
