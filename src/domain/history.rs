//! Call history records
//!
//! A history entry is written when a call ends. Persistence is best-effort:
//! recorders report failures, and the service counts and logs them.

use crate::domain::call::{Call, CallDirection};
use crate::domain::shared::error::Result;
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// History record of a finished call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry ID
    pub id: Uuid,

    pub call_id: CallId,
    /// Conference the call belonged to when it ended
    pub conference_id: ConferenceId,
    pub account: AccountId,

    /// Remote party
    pub number: String,
    pub display_name: String,

    pub direction: CallDirection,

    /// Time information
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,

    /// Incoming call that was never answered
    pub missed: bool,
    pub record_path: Option<String>,
}

impl HistoryEntry {
    pub fn from_call(call: &Call, conference_id: &ConferenceId) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_id: call.id().clone(),
            conference_id: conference_id.clone(),
            account: call.account().clone(),
            number: call.contact().number().to_string(),
            display_name: call.contact().display_name().to_string(),
            direction: call.direction(),
            started_at: call.started_at(),
            answered_at: call.answered_at(),
            ended_at: call.ended_at().unwrap_or_else(Utc::now),
            missed: call.direction() == CallDirection::Incoming && call.answered_at().is_none(),
            record_path: call.record_path().map(str::to_string),
        }
    }

    /// Talk time in seconds
    pub fn duration_seconds(&self) -> Option<i64> {
        self.answered_at
            .map(|answered| (self.ended_at - answered).num_seconds())
    }
}

/// Persistence port for call history
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Persist a new entry
    async fn insert_new_entry(&self, entry: &HistoryEntry) -> Result<()>;

    /// Entries, newest first
    async fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>>;
}
