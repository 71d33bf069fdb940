//! Port to the native daemon
//!
//! The daemon performs the actual signalling and media work. Every method
//! maps to one daemon command; failures surface as `DomainError::Transport`.

use crate::domain::shared::error::Result;
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

/// Detail key holding the call start as seconds since the epoch
pub const TIMESTAMP_START: &str = "TIMESTAMP_START";
/// Detail key holding the conference state name
pub const CONF_STATE: &str = "CONF_STATE";

/// Detail map returned by the daemon for a call or conference
pub type Details = HashMap<String, String>;

/// Start timestamp from a call detail map
pub fn start_timestamp(details: &Details) -> Option<DateTime<Utc>> {
    let secs = details.get(TIMESTAMP_START)?.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Daemon: Send + Sync {
    /// Place a call; the daemon assigns the identifier
    async fn place_call(&self, account: &AccountId, number: &str) -> Result<CallId>;

    async fn accept(&self, call_id: &CallId) -> Result<()>;

    async fn refuse(&self, call_id: &CallId) -> Result<()>;

    async fn hang_up(&self, call_id: &CallId) -> Result<()>;

    async fn hold(&self, call_id: &CallId) -> Result<()>;

    async fn unhold(&self, call_id: &CallId) -> Result<()>;

    /// Merge two lone calls into a new conference
    async fn join_participant(&self, sel_call: &CallId, drag_call: &CallId) -> Result<()>;

    async fn add_participant(&self, call_id: &CallId, conf_id: &ConferenceId) -> Result<()>;

    async fn join_conference(&self, sel_conf: &ConferenceId, drag_conf: &ConferenceId) -> Result<()>;

    async fn detach_participant(&self, call_id: &CallId) -> Result<()>;

    async fn hang_up_conference(&self, conf_id: &ConferenceId) -> Result<()>;

    async fn hold_conference(&self, conf_id: &ConferenceId) -> Result<()>;

    async fn unhold_conference(&self, conf_id: &ConferenceId) -> Result<()>;

    /// Authoritative participant list of a conference
    async fn participant_list(&self, conf_id: &ConferenceId) -> Result<Vec<CallId>>;

    async fn call_details(&self, call_id: &CallId) -> Result<Details>;

    async fn conference_details(&self, conf_id: &ConferenceId) -> Result<Details>;

    /// Toggle recording of a call or conference; returns the new flag
    async fn toggle_recording(&self, id: &str) -> Result<bool>;

    async fn send_text_message(&self, id: &str, body: &str) -> Result<()>;

    async fn set_sas_verified(&self, call_id: &CallId) -> Result<()>;

    /// Whether calls on the account negotiate a secure transport
    async fn uses_secure_layer(&self, account: &AccountId) -> Result<bool>;
}
