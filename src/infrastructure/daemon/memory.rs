//! Scriptable in-process daemon
//!
//! Stands in for the native daemon: it answers queries from scripted state,
//! hands out call identifiers and journals every command it receives.

use crate::domain::daemon::{Daemon, Details, CONF_STATE};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct DaemonState {
    participants: HashMap<ConferenceId, Vec<CallId>>,
    call_details: HashMap<CallId, Details>,
    conference_details: HashMap<ConferenceId, Details>,
    secure_accounts: HashSet<AccountId>,
    recording: HashMap<String, bool>,
    journal: Vec<String>,
}

pub struct MemoryDaemon {
    state: RwLock<DaemonState>,
    next_call: AtomicU64,
    failing: AtomicBool,
}

impl Default for MemoryDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDaemon {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DaemonState::default()),
            next_call: AtomicU64::new(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent command fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn set_participants(&self, conf_id: &str, call_ids: &[&str]) {
        let mut state = self.state.write().await;
        state.participants.insert(
            ConferenceId::new(conf_id),
            call_ids.iter().map(|id| CallId::new(*id)).collect(),
        );
    }

    pub async fn set_call_details(&self, call_id: &str, details: Details) {
        let mut state = self.state.write().await;
        state.call_details.insert(CallId::new(call_id), details);
    }

    pub async fn set_conference_state(&self, conf_id: &str, conf_state: &str) {
        let mut state = self.state.write().await;
        state
            .conference_details
            .entry(ConferenceId::new(conf_id))
            .or_default()
            .insert(CONF_STATE.to_string(), conf_state.to_string());
    }

    pub async fn set_secure_account(&self, account: &str) {
        let mut state = self.state.write().await;
        state.secure_accounts.insert(AccountId::new(account));
    }

    /// Commands received so far, oldest first
    pub async fn journal(&self) -> Vec<String> {
        self.state.read().await.journal.clone()
    }

    async fn record(&self, command: String) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Transport(format!("daemon unreachable: {}", command)));
        }
        debug!("daemon command: {}", command);
        self.state.write().await.journal.push(command);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Daemon for MemoryDaemon {
    async fn place_call(&self, account: &AccountId, number: &str) -> Result<CallId> {
        self.record(format!("place_call {} {}", account, number)).await?;
        let call_id = CallId::new(format!("call-{}", self.next_call.fetch_add(1, Ordering::SeqCst)));
        Ok(call_id)
    }

    async fn accept(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("accept {}", call_id)).await
    }

    async fn refuse(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("refuse {}", call_id)).await
    }

    async fn hang_up(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("hang_up {}", call_id)).await
    }

    async fn hold(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("hold {}", call_id)).await
    }

    async fn unhold(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("unhold {}", call_id)).await
    }

    async fn join_participant(&self, sel_call: &CallId, drag_call: &CallId) -> Result<()> {
        self.record(format!("join_participant {} {}", sel_call, drag_call)).await
    }

    async fn add_participant(&self, call_id: &CallId, conf_id: &ConferenceId) -> Result<()> {
        self.record(format!("add_participant {} {}", call_id, conf_id)).await
    }

    async fn join_conference(&self, sel_conf: &ConferenceId, drag_conf: &ConferenceId) -> Result<()> {
        self.record(format!("join_conference {} {}", sel_conf, drag_conf)).await
    }

    async fn detach_participant(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("detach_participant {}", call_id)).await
    }

    async fn hang_up_conference(&self, conf_id: &ConferenceId) -> Result<()> {
        self.record(format!("hang_up_conference {}", conf_id)).await
    }

    async fn hold_conference(&self, conf_id: &ConferenceId) -> Result<()> {
        self.record(format!("hold_conference {}", conf_id)).await
    }

    async fn unhold_conference(&self, conf_id: &ConferenceId) -> Result<()> {
        self.record(format!("unhold_conference {}", conf_id)).await
    }

    async fn participant_list(&self, conf_id: &ConferenceId) -> Result<Vec<CallId>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Transport("daemon unreachable".to_string()));
        }
        Ok(self
            .state
            .read()
            .await
            .participants
            .get(conf_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn call_details(&self, call_id: &CallId) -> Result<Details> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Transport("daemon unreachable".to_string()));
        }
        self.state
            .read()
            .await
            .call_details
            .get(call_id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("call {}", call_id)))
    }

    async fn conference_details(&self, conf_id: &ConferenceId) -> Result<Details> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Transport("daemon unreachable".to_string()));
        }
        Ok(self
            .state
            .read()
            .await
            .conference_details
            .get(conf_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn toggle_recording(&self, id: &str) -> Result<bool> {
        self.record(format!("toggle_recording {}", id)).await?;
        let mut state = self.state.write().await;
        let flag = state.recording.entry(id.to_string()).or_insert(false);
        *flag = !*flag;
        Ok(*flag)
    }

    async fn send_text_message(&self, id: &str, body: &str) -> Result<()> {
        self.record(format!("send_text_message {} {}", id, body)).await
    }

    async fn set_sas_verified(&self, call_id: &CallId) -> Result<()> {
        self.record(format!("set_sas_verified {}", call_id)).await
    }

    async fn uses_secure_layer(&self, account: &AccountId) -> Result<bool> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Transport("daemon unreachable".to_string()));
        }
        Ok(self.state.read().await.secure_accounts.contains(account))
    }
}
