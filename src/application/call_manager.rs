//! Call manager
//!
//! Owns the conference registry and reacts to daemon callbacks and service
//! commands. It is only ever driven by the service worker, one task at a
//! time, so it needs no locking of its own.

use crate::application::callback::DaemonCallback;
use crate::application::events::{now, EventBroadcaster, ServiceEvent};
use crate::application::stats::{update_active_conferences, ServiceStats};
use crate::domain::call::{Call, CallState, ContactDirectory};
use crate::domain::conference::{Conference, ConferenceState, TextMessage};
use crate::domain::daemon::{start_timestamp, Daemon, Details, CONF_STATE};
use crate::domain::history::{HistoryEntry, HistoryRecorder};
use crate::domain::registry::{ConferenceRegistry, RemovedCall};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct CallManager {
    registry: ConferenceRegistry,
    daemon: Arc<dyn Daemon>,
    history: Arc<dyn HistoryRecorder>,
    contacts: Arc<dyn ContactDirectory>,
    events: EventBroadcaster,
    stats: ServiceStats,
    history_timeout: Duration,
}

impl CallManager {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        history: Arc<dyn HistoryRecorder>,
        contacts: Arc<dyn ContactDirectory>,
        events: EventBroadcaster,
        history_timeout: Duration,
    ) -> Self {
        Self {
            registry: ConferenceRegistry::new(),
            daemon,
            history,
            contacts,
            events,
            stats: ServiceStats::default(),
            history_timeout,
        }
    }

    pub fn registry(&self) -> &ConferenceRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Apply one daemon callback. Failures have no caller to report to, so
    /// they are logged and counted here.
    pub async fn handle_callback(&mut self, callback: DaemonCallback) {
        let name = callback.name();
        self.stats.record_callback(name);

        let result = match callback {
            DaemonCallback::CallStateChanged { call_id, state } => {
                self.call_state_changed(&call_id, &state).await
            }
            DaemonCallback::IncomingCall {
                account,
                call_id,
                from,
            } => self.incoming_call(account, call_id, &from).await,
            DaemonCallback::IncomingMessage {
                target,
                from,
                message,
            } => self.incoming_message(&target, &from, &message),
            DaemonCallback::ConferenceCreated { conf_id } => self.conference_created(conf_id).await,
            DaemonCallback::ConferenceRemoved { conf_id } => self.conference_removed(&conf_id),
            DaemonCallback::ConferenceStateChanged { conf_id, state } => {
                self.conference_state_changed(&conf_id, &state).await
            }
            DaemonCallback::RecordPlaybackFilepath { call_id, filename } => {
                self.record_playback_filepath(call_id, filename)
            }
            DaemonCallback::SecureZrtpOn { call_id, cipher } => self.secure_zrtp_on(&call_id, cipher),
            DaemonCallback::SecureZrtpOff { call_id } => self.secure_zrtp_off(&call_id),
            DaemonCallback::ShowSas {
                call_id,
                sas,
                verified,
            } => self.show_sas(&call_id, sas, verified),
            DaemonCallback::ZrtpNotSupported { call_id } => self.zrtp_not_supported(&call_id),
            DaemonCallback::ZrtpNegotiationFailed {
                call_id,
                reason,
                severity,
            } => self.zrtp_negotiation_failed(&call_id, reason, severity),
        };

        match result {
            Ok(()) => {}
            Err(DomainError::NotFound(what)) => {
                warn!("{}: unresolved identifier ({})", name, what);
                self.stats.record_unresolved(name, 1);
            }
            Err(DomainError::UnknownState { kind, value }) => {
                warn!("{}: unknown {} state {:?}", name, kind, value);
                self.stats.record_unknown_state(kind);
            }
            Err(e) => {
                error!("{} failed: {}", name, e);
                self.stats.record_callback_error(name);
            }
        }

        self.after_mutation();
    }

    pub async fn call_state_changed(&mut self, call_id: &CallId, state_name: &str) -> Result<()> {
        info!("on_call_state_changed: ({}, {})", call_id, state_name);

        let new_state = CallState::from_daemon(state_name)?;
        let call = self.registry.call_mut(call_id)?;
        let was_ringing = call.is_ringing();
        let incoming = call.is_incoming();
        let from = call.contact().number().to_string();

        let transition = call.apply_state(new_state);
        if transition.is_noop() {
            debug!("Call {} already {}", call_id, new_state);
            return Ok(());
        }

        if !new_state.is_terminal() {
            let conference = self.registry.find_conference(call_id.as_str()).ok().cloned();
            self.events.broadcast(ServiceEvent::CallStateChanged {
                call_id: call_id.clone(),
                state: new_state,
                conference,
                timestamp: now(),
            });
            return Ok(());
        }

        let removed = self.registry.remove_call(call_id)?;
        match new_state {
            CallState::Hungup => {
                if was_ringing && incoming {
                    info!("Missed call {} from {}", call_id, from);
                    self.events.broadcast(ServiceEvent::MissedCall {
                        call_id: call_id.clone(),
                        from,
                        timestamp: now(),
                    });
                }
                self.record_history(&removed).await;
            }
            CallState::Failure => {
                if let Err(e) = self.daemon.hang_up(call_id).await {
                    warn!("Failed to hang up failed call {}: {}", call_id, e);
                }
            }
            _ => {}
        }

        let conference = if removed.conference_removed {
            None
        } else {
            self.registry.get(removed.conference_id.as_str()).cloned()
        };
        self.events.broadcast(ServiceEvent::CallStateChanged {
            call_id: call_id.clone(),
            state: new_state,
            conference,
            timestamp: now(),
        });
        Ok(())
    }

    pub async fn incoming_call(&mut self, account: AccountId, call_id: CallId, from: &str) -> Result<()> {
        info!("on_incoming_call({}, {}, {})", account, call_id, from);

        let details = match self.daemon.call_details(&call_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!("No call details for {}: {}", call_id, e);
                Details::new()
            }
        };
        let secure = match self.daemon.uses_secure_layer(&account).await {
            Ok(secure) => secure,
            Err(e) => {
                warn!("Cannot query secure layer of account {}: {}", account, e);
                false
            }
        };

        let contact = self.contacts.resolve(from);
        let mut call = Call::incoming(call_id.clone(), account.clone(), contact);
        match start_timestamp(&details) {
            Some(started_at) => call = call.with_started_at(started_at),
            None => debug!("Daemon gave no start time for {}, using local clock", call_id),
        }
        if secure {
            call = call.with_secure_channel();
        }

        let key = self.registry.insert_call(call)?;
        let conference = self.conference_snapshot(&key)?;
        self.events.broadcast(ServiceEvent::IncomingCall {
            account,
            call_id,
            conference,
            timestamp: now(),
        });
        Ok(())
    }

    pub fn incoming_message(&mut self, target: &str, from: &str, body: &str) -> Result<()> {
        info!("on_incoming_message: {} from {}", target, from);

        let message = TextMessage::incoming(from, body);
        let conference = self.registry.find_conference_mut(target)?;
        conference.add_message(message.clone());
        let conference = Some(conference.clone());

        self.events.broadcast(ServiceEvent::IncomingText {
            target: target.to_string(),
            message,
            conference,
            timestamp: now(),
        });
        Ok(())
    }

    pub async fn conference_created(&mut self, conf_id: ConferenceId) -> Result<()> {
        info!("on_conference_created: {}", conf_id);

        let participants = self.daemon.participant_list(&conf_id).await?;
        let outcome = self.registry.create_conference(conf_id.clone(), &participants)?;
        if !outcome.unresolved.is_empty() {
            warn!(
                "Conference {} lists {} unknown participants",
                conf_id,
                outcome.unresolved.len()
            );
            self.stats
                .record_unresolved("conference_created", outcome.unresolved.len() as u64);
        }

        let conference = self.conference_snapshot(&conf_id)?;
        self.events.broadcast(ServiceEvent::ConferenceCreated {
            conf_id,
            conference,
            timestamp: now(),
        });
        Ok(())
    }

    pub fn conference_removed(&mut self, conf_id: &ConferenceId) -> Result<()> {
        info!("on_conference_removed: {}", conf_id);

        let restored = self.registry.dissolve(conf_id)?;
        self.events.broadcast(ServiceEvent::ConferenceRemoved {
            conf_id: conf_id.clone(),
            restored,
            timestamp: now(),
        });
        Ok(())
    }

    pub async fn conference_state_changed(&mut self, conf_id: &ConferenceId, state_name: &str) -> Result<()> {
        info!("on_conference_state_changed: ({}, {})", conf_id, state_name);

        if self.registry.get(conf_id.as_str()).is_none() {
            return Err(DomainError::NotFound(format!("conference {}", conf_id)));
        }
        // Fetch before mutating so a transport failure leaves the registry alone
        let participants = self.daemon.participant_list(conf_id).await?;

        let outcome = self.registry.reconcile(conf_id, &participants)?;
        if !outcome.unresolved.is_empty() {
            self.stats
                .record_unresolved("conference_state_changed", outcome.unresolved.len() as u64);
        }

        match ConferenceState::from_daemon(state_name) {
            Ok(state) => {
                if let Some(conference) = self.registry.get_mut(conf_id.as_str()) {
                    conference.set_state(state);
                }
            }
            Err(e) => {
                warn!("Conference {}: {}", conf_id, e);
                self.stats.record_unknown_state("conference");
            }
        }

        self.events.broadcast(ServiceEvent::ConferenceChanged {
            conf_id: conf_id.clone(),
            state: state_name.to_string(),
            conference: self.registry.get(conf_id.as_str()).cloned(),
            timestamp: now(),
        });
        Ok(())
    }

    pub fn record_playback_filepath(&mut self, call_id: CallId, filename: String) -> Result<()> {
        info!("on_record_playback_filepath: ({}, {})", call_id, filename);

        match self.registry.call_mut(&call_id) {
            Ok(call) => call.set_record_path(filename.clone()),
            Err(_) => {
                warn!("Recording {} belongs to unknown call {}", filename, call_id);
                self.stats.record_unresolved("record_playback_filepath", 1);
            }
        }
        self.events.broadcast(ServiceEvent::RecordPlaybackFilepath {
            call_id,
            filename,
            timestamp: now(),
        });
        Ok(())
    }

    pub fn secure_zrtp_on(&mut self, call_id: &CallId, cipher: String) -> Result<()> {
        info!("on_secure_zrtp_on: {}", call_id);

        self.registry.call_mut(call_id)?.secure_mut().zrtp_on(cipher.clone());
        self.events.broadcast(ServiceEvent::SecureZrtpOn {
            call_id: call_id.clone(),
            cipher,
            conference: self.owning_conference(call_id),
            timestamp: now(),
        });
        Ok(())
    }

    pub fn secure_zrtp_off(&mut self, call_id: &CallId) -> Result<()> {
        info!("on_secure_zrtp_off: {}", call_id);

        // Security goes off when a call is hung up, which may already be gone
        let Ok(call) = self.registry.call_mut(call_id) else {
            debug!("ZRTP off for ended call {}", call_id);
            return Ok(());
        };
        call.secure_mut().zrtp_off();
        self.events.broadcast(ServiceEvent::SecureZrtpOff {
            call_id: call_id.clone(),
            conference: self.owning_conference(call_id),
            timestamp: now(),
        });
        Ok(())
    }

    pub fn show_sas(&mut self, call_id: &CallId, sas: String, verified: bool) -> Result<()> {
        info!("on_show_sas: {}", call_id);

        self.registry.call_mut(call_id)?.secure_mut().show_sas(sas.clone(), verified);
        self.events.broadcast(ServiceEvent::DisplaySas {
            call_id: call_id.clone(),
            sas,
            verified,
            conference: self.owning_conference(call_id),
            timestamp: now(),
        });
        Ok(())
    }

    pub fn zrtp_not_supported(&mut self, call_id: &CallId) -> Result<()> {
        info!("on_zrtp_not_supported: {}", call_id);

        self.registry.call_mut(call_id)?.secure_mut().not_supported();
        self.events.broadcast(ServiceEvent::ZrtpNotSupported {
            call_id: call_id.clone(),
            conference: self.owning_conference(call_id),
            timestamp: now(),
        });
        Ok(())
    }

    pub fn zrtp_negotiation_failed(&mut self, call_id: &CallId, reason: String, severity: String) -> Result<()> {
        info!("on_zrtp_negotiation_failed: {} ({}, {})", call_id, reason, severity);

        self.registry
            .call_mut(call_id)?
            .secure_mut()
            .negotiation_failed(reason.clone(), severity.clone());
        self.events.broadcast(ServiceEvent::ZrtpNegotiationFailed {
            call_id: call_id.clone(),
            reason,
            severity,
            conference: self.owning_conference(call_id),
            timestamp: now(),
        });
        Ok(())
    }

    // Commands. Daemon first, registry after: a transport failure aborts
    // the command before any local mutation.

    pub async fn place_call(&mut self, account: AccountId, number: &str) -> Result<CallId> {
        info!("place_call: {} -> {}", account, number);

        let secure = self.daemon.uses_secure_layer(&account).await?;
        let call_id = self.daemon.place_call(&account, number).await?;

        let contact = self.contacts.resolve(number);
        let mut call = Call::outgoing(call_id.clone(), account, contact);
        if secure {
            call = call.with_secure_channel();
        }
        self.registry.insert_call(call)?;
        Ok(call_id)
    }

    pub async fn accept(&mut self, call_id: &CallId) -> Result<()> {
        self.registry.call(call_id)?;
        self.daemon.accept(call_id).await
    }

    pub async fn refuse(&mut self, call_id: &CallId) -> Result<()> {
        self.registry.call(call_id)?;
        self.daemon.refuse(call_id).await
    }

    /// Ask the daemon to end the call; the registry changes when the daemon
    /// reports `HUNGUP`.
    pub async fn hang_up(&mut self, call_id: &CallId) -> Result<()> {
        self.registry.call(call_id)?;
        self.daemon.hang_up(call_id).await
    }

    pub async fn hold(&mut self, call_id: &CallId) -> Result<()> {
        self.registry.call(call_id)?;
        self.daemon.hold(call_id).await
    }

    pub async fn unhold(&mut self, call_id: &CallId) -> Result<()> {
        self.registry.call(call_id)?;
        self.daemon.unhold(call_id).await
    }

    /// Merge two calls; the new conference arrives via `conference_created`
    pub async fn create_conference(&mut self, sel_call: &CallId, drag_call: &CallId) -> Result<()> {
        if sel_call == drag_call {
            return Err(DomainError::InvalidOperation(format!(
                "cannot join call {} with itself",
                sel_call
            )));
        }
        self.registry.call(sel_call)?;
        self.registry.call(drag_call)?;
        self.daemon.join_participant(sel_call, drag_call).await
    }

    pub async fn join_conference(&mut self, sel_conf: &ConferenceId, drag_conf: &ConferenceId) -> Result<()> {
        self.existing_conference(sel_conf)?;
        self.existing_conference(drag_conf)?;
        self.daemon.join_conference(sel_conf, drag_conf).await
    }

    pub async fn add_participant(&mut self, call_id: &CallId, conf_id: &ConferenceId) -> Result<()> {
        self.registry.call(call_id)?;
        if self.existing_conference(conf_id)?.contains(&CallId::new(conf_id.as_str())) {
            return Err(DomainError::InvalidOperation(format!(
                "{} is a single call; merge it with create_conference",
                conf_id
            )));
        }
        self.daemon.add_participant(call_id, conf_id).await?;
        self.registry.attach(conf_id, call_id)
    }

    pub async fn detach_participant(&mut self, call_id: &CallId) -> Result<ConferenceId> {
        let owner = self.registry.owner_of(call_id)?.clone();
        self.daemon.detach_participant(call_id).await?;
        self.registry.detach(&owner, call_id)
    }

    pub async fn hang_up_conference(&mut self, conf_id: &ConferenceId) -> Result<()> {
        self.existing_conference(conf_id)?;
        self.daemon.hang_up_conference(conf_id).await
    }

    pub async fn hold_conference(&mut self, conf_id: &ConferenceId) -> Result<()> {
        self.existing_conference(conf_id)?;
        self.daemon.hold_conference(conf_id).await
    }

    pub async fn unhold_conference(&mut self, conf_id: &ConferenceId) -> Result<()> {
        self.existing_conference(conf_id)?;
        self.daemon.unhold_conference(conf_id).await
    }

    /// Toggle recording of a conference (direct key) or of a single call
    pub async fn toggle_recording(&mut self, id: &str) -> Result<bool> {
        self.registry.resolve(id)?;
        let recording = self.daemon.toggle_recording(id).await?;

        let call_id = CallId::new(id);
        let conference = self.registry.find_conference_mut(id)?;
        if conference.id().as_str() == id {
            // A lone call shares its key with the conference wrapping it
            conference.set_recording(recording);
            if let Some(call) = conference.call_mut(&call_id) {
                call.set_recording(recording);
            }
        } else {
            conference
                .call_mut(&call_id)
                .ok_or_else(|| DomainError::NotFound(format!("call {}", call_id)))?
                .set_recording(recording);
        }
        Ok(recording)
    }

    pub async fn send_text_message(&mut self, target: &str, body: &str) -> Result<()> {
        self.registry.resolve(target)?;
        self.daemon.send_text_message(target, body).await?;
        self.registry
            .find_conference_mut(target)?
            .add_message(TextMessage::outgoing(body));
        Ok(())
    }

    pub async fn confirm_sas(&mut self, call_id: &CallId) -> Result<()> {
        self.registry.call(call_id)?;
        self.daemon.set_sas_verified(call_id).await?;
        self.registry.call_mut(call_id)?.secure_mut().confirm_sas();
        Ok(())
    }

    // Queries

    pub fn get_call(&self, call_id: &CallId) -> Result<Call> {
        self.registry.call(call_id).cloned()
    }

    pub fn get_conference(&self, id: &str) -> Result<Conference> {
        self.registry.find_conference(id).cloned()
    }

    /// All conferences, oldest first
    pub fn concurrent_calls(&self) -> Vec<Conference> {
        let mut conferences: Vec<Conference> = self.registry.conferences().cloned().collect();
        conferences.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        conferences
    }

    /// The conference to present: an incoming one first, else an ongoing one
    pub fn current_call(&self) -> Option<Conference> {
        let conferences = self.concurrent_calls();
        conferences
            .iter()
            .find(|c| c.is_incoming())
            .or_else(|| conferences.iter().find(|c| c.is_ongoing()))
            .cloned()
    }

    pub async fn call_details(&self, call_id: &CallId) -> Result<Details> {
        self.daemon.call_details(call_id).await
    }

    pub async fn conference_details(&self, conf_id: &ConferenceId) -> Result<String> {
        let details = self.daemon.conference_details(conf_id).await?;
        details
            .get(CONF_STATE)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("{} of conference {}", CONF_STATE, conf_id)))
    }

    pub async fn participant_list(&self, conf_id: &ConferenceId) -> Result<Vec<CallId>> {
        self.daemon.participant_list(conf_id).await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.history.list(limit).await
    }

    pub(crate) fn record_command(&mut self, name: &'static str) {
        self.stats.record_command(name);
    }

    /// Persist a history entry without letting a slow store stall the queue.
    /// Returns whether the entry was written.
    async fn record_history(&mut self, removed: &RemovedCall) -> bool {
        let entry = HistoryEntry::from_call(&removed.call, &removed.conference_id);
        match tokio::time::timeout(self.history_timeout, self.history.insert_new_entry(&entry)).await {
            Ok(Ok(())) => {
                debug!("History entry {} written for call {}", entry.id, entry.call_id);
                self.stats.record_history_written();
                true
            }
            Ok(Err(e)) => {
                error!("Failed to persist history for call {}: {}", entry.call_id, e);
                self.stats.record_history_failure();
                false
            }
            Err(_) => {
                error!(
                    "History store timed out after {:?} for call {}",
                    self.history_timeout, entry.call_id
                );
                self.stats.record_history_failure();
                false
            }
        }
    }

    fn existing_conference(&self, conf_id: &ConferenceId) -> Result<&Conference> {
        self.registry
            .get(conf_id.as_str())
            .ok_or_else(|| DomainError::NotFound(format!("conference {}", conf_id)))
    }

    fn conference_snapshot(&self, conf_id: &ConferenceId) -> Result<Conference> {
        self.existing_conference(conf_id).cloned()
    }

    fn owning_conference(&self, call_id: &CallId) -> Option<Conference> {
        self.registry.find_conference(call_id.as_str()).ok().cloned()
    }

    pub(crate) fn after_mutation(&self) {
        update_active_conferences(self.registry.len());
        if cfg!(debug_assertions) {
            if let Err(e) = self.registry.check_invariants() {
                error!("Registry invariant violated: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::daemon::MockDaemon;
    use crate::infrastructure::persistence::{MemoryContactDirectory, MemoryHistoryRepository};

    fn permissive_daemon() -> MockDaemon {
        let mut daemon = MockDaemon::new();
        daemon.expect_call_details().returning(|_| Ok(Details::new()));
        daemon.expect_uses_secure_layer().returning(|_| Ok(false));
        daemon
    }

    fn manager(daemon: MockDaemon) -> (CallManager, Arc<MemoryHistoryRepository>) {
        let history = Arc::new(MemoryHistoryRepository::new(10));
        let manager = CallManager::new(
            Arc::new(daemon),
            history.clone(),
            Arc::new(MemoryContactDirectory::new()),
            EventBroadcaster::new(16),
            Duration::from_millis(500),
        );
        (manager, history)
    }

    async fn ring(manager: &mut CallManager, id: &str) {
        manager
            .incoming_call(AccountId::new("acct1"), CallId::new(id), "+15551234567")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_incoming_call_registers_single_conference() {
        let (mut manager, _) = manager(permissive_daemon());
        let mut events = manager.events.subscribe();

        ring(&mut manager, "A").await;

        let conference = manager.get_conference("A").unwrap();
        assert_eq!(conference.participant_ids(), vec![CallId::new("A")]);
        assert_eq!(manager.get_call(&CallId::new("A")).unwrap().state(), CallState::Ringing);
        assert_eq!(events.recv().await.unwrap().event_type(), "incoming_call");
    }

    #[tokio::test]
    async fn test_incoming_call_survives_daemon_query_failures() {
        let mut daemon = MockDaemon::new();
        daemon
            .expect_call_details()
            .returning(|_| Err(DomainError::Transport("down".to_string())));
        daemon.expect_uses_secure_layer().returning(|_| Ok(true));
        let (mut manager, _) = manager(daemon);

        ring(&mut manager, "A").await;

        let call = manager.get_call(&CallId::new("A")).unwrap();
        assert!(call.secure().is_some());
    }

    #[tokio::test]
    async fn test_detach_transport_failure_leaves_registry_unchanged() {
        let mut daemon = permissive_daemon();
        daemon
            .expect_participant_list()
            .returning(|_| Ok(vec![CallId::new("A"), CallId::new("B")]));
        daemon
            .expect_detach_participant()
            .times(1)
            .returning(|_| Err(DomainError::Transport("link down".to_string())));
        let (mut manager, _) = manager(daemon);
        ring(&mut manager, "A").await;
        ring(&mut manager, "B").await;
        manager.conference_created(ConferenceId::new("conf-1")).await.unwrap();

        let err = manager.detach_participant(&CallId::new("A")).await.unwrap_err();

        assert!(matches!(err, DomainError::Transport(_)));
        assert_eq!(manager.get_conference("conf-1").unwrap().participant_count(), 2);
        assert!(manager.registry().check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_participant_list_failure_is_counted() {
        let mut daemon = permissive_daemon();
        let mut lists = vec![
            Err(DomainError::Transport("timeout".to_string())),
            Ok(vec![CallId::new("A"), CallId::new("B")]),
        ];
        daemon
            .expect_participant_list()
            .returning(move |_| lists.pop().unwrap_or_else(|| Ok(Vec::new())));
        let (mut manager, _) = manager(daemon);
        ring(&mut manager, "A").await;
        ring(&mut manager, "B").await;
        manager
            .handle_callback(DaemonCallback::conference_created("conf-1"))
            .await;

        manager
            .handle_callback(DaemonCallback::conference_state_changed("conf-1", "ACTIVE_ATTACHED"))
            .await;

        let conference = manager.get_conference("conf-1").unwrap();
        assert_eq!(conference.participant_count(), 2);
        assert_eq!(conference.conference_state(), None);
        assert_eq!(manager.stats().callback_errors, 1);
    }

    #[tokio::test]
    async fn test_failure_state_hangs_up() {
        let mut daemon = permissive_daemon();
        daemon.expect_hang_up().times(1).returning(|_| Ok(()));
        let (mut manager, history) = manager(daemon);
        ring(&mut manager, "A").await;

        manager
            .handle_callback(DaemonCallback::call_state_changed("A", "FAILURE"))
            .await;

        assert!(manager.registry().is_empty());
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn test_hang_up_waits_for_daemon_confirmation() {
        let mut daemon = permissive_daemon();
        daemon.expect_hang_up().times(1).returning(|_| Ok(()));
        let (mut manager, history) = manager(daemon);
        ring(&mut manager, "A").await;

        manager.hang_up(&CallId::new("A")).await.unwrap();
        assert!(manager.get_call(&CallId::new("A")).is_ok());

        manager.call_state_changed(&CallId::new("A"), "HUNGUP").await.unwrap();
        assert!(manager.registry().is_empty());
        assert_eq!(history.len().await, 1);
        assert_eq!(manager.stats().history_written, 1);
    }

    #[tokio::test]
    async fn test_history_failure_is_counted() {
        let (mut manager, history) = manager(permissive_daemon());
        history.set_failing(true);
        ring(&mut manager, "A").await;

        manager.call_state_changed(&CallId::new("A"), "HUNGUP").await.unwrap();

        assert!(manager.registry().is_empty());
        assert_eq!(manager.stats().history_failures, 1);
    }

    #[tokio::test]
    async fn test_place_call_registers_outgoing_call() {
        let mut daemon = MockDaemon::new();
        daemon.expect_uses_secure_layer().returning(|_| Ok(false));
        daemon
            .expect_place_call()
            .returning(|_, _| Ok(CallId::new("out-1")));
        let (mut manager, _) = manager(daemon);

        let call_id = manager.place_call(AccountId::new("acct1"), "100").await.unwrap();

        let call = manager.get_call(&call_id).unwrap();
        assert!(!call.is_incoming());
        assert_eq!(call.state(), CallState::None);
    }

    #[tokio::test]
    async fn test_create_conference_rejects_same_call() {
        let (mut manager, _) = manager(permissive_daemon());
        ring(&mut manager, "A").await;

        let err = manager
            .create_conference(&CallId::new("A"), &CallId::new("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_toggle_recording_on_call_and_conference() {
        let mut daemon = permissive_daemon();
        daemon
            .expect_participant_list()
            .returning(|_| Ok(vec![CallId::new("A"), CallId::new("B")]));
        daemon.expect_toggle_recording().returning(|_| Ok(true));
        let (mut manager, _) = manager(daemon);
        ring(&mut manager, "A").await;
        ring(&mut manager, "B").await;
        ring(&mut manager, "C").await;
        manager.conference_created(ConferenceId::new("conf-1")).await.unwrap();

        assert!(manager.toggle_recording("conf-1").await.unwrap());
        assert!(manager.get_conference("conf-1").unwrap().is_recording());

        assert!(manager.toggle_recording("C").await.unwrap());
        assert!(manager.get_call(&CallId::new("C")).unwrap().is_recording());
    }

    #[tokio::test]
    async fn test_zrtp_events_track_secure_channel() {
        let (mut manager, _) = manager(permissive_daemon());
        ring(&mut manager, "A").await;
        let call_id = CallId::new("A");

        manager.secure_zrtp_on(&call_id, "AES-256".to_string()).unwrap();
        manager.show_sas(&call_id, "ab12".to_string(), false).unwrap();

        let call = manager.get_call(&call_id).unwrap();
        let secure = call.secure().unwrap();
        assert_eq!(secure.cipher(), Some("AES-256"));
        assert_eq!(secure.sas(), Some("ab12"));

        // Off for a call that is already gone is not an error
        assert!(manager.secure_zrtp_off(&CallId::new("gone")).is_ok());
        assert!(manager.show_sas(&CallId::new("gone"), "x".to_string(), true).is_err());
    }

    #[tokio::test]
    async fn test_current_call_prefers_incoming() {
        let mut daemon = MockDaemon::new();
        daemon.expect_call_details().returning(|_| Ok(Details::new()));
        daemon.expect_uses_secure_layer().returning(|_| Ok(false));
        daemon
            .expect_place_call()
            .returning(|_, _| Ok(CallId::new("out-1")));
        let (mut manager, _) = manager(daemon);

        manager.place_call(AccountId::new("acct1"), "100").await.unwrap();
        manager.call_state_changed(&CallId::new("out-1"), "CURRENT").await.unwrap();
        assert_eq!(manager.current_call().unwrap().id().as_str(), "out-1");

        ring(&mut manager, "A").await;
        assert_eq!(manager.current_call().unwrap().id().as_str(), "A");
    }

    #[tokio::test]
    async fn test_record_playback_filepath_sets_path() {
        let (mut manager, _) = manager(permissive_daemon());
        let mut events = manager.events.subscribe();
        ring(&mut manager, "A").await;

        manager
            .handle_callback(DaemonCallback::RecordPlaybackFilepath {
                call_id: CallId::new("A"),
                filename: "/sdcard/rec-a.wav".to_string(),
            })
            .await;

        let call = manager.get_call(&CallId::new("A")).unwrap();
        assert_eq!(call.record_path(), Some("/sdcard/rec-a.wav"));
        assert_eq!(manager.stats().unresolved_identifiers, 0);
        assert_eq!(events.recv().await.unwrap().event_type(), "incoming_call");
        assert_eq!(events.recv().await.unwrap().event_type(), "record_playback_filepath");
    }

    #[tokio::test]
    async fn test_record_playback_filepath_for_unknown_call_is_counted() {
        let (mut manager, _) = manager(permissive_daemon());

        manager
            .handle_callback(DaemonCallback::RecordPlaybackFilepath {
                call_id: CallId::new("ghost"),
                filename: "/sdcard/rec-ghost.wav".to_string(),
            })
            .await;

        assert_eq!(manager.stats().unresolved_identifiers, 1);
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_zrtp_not_supported_marks_channel() {
        let (mut manager, _) = manager(permissive_daemon());
        ring(&mut manager, "A").await;
        let mut events = manager.events.subscribe();

        manager
            .handle_callback(DaemonCallback::ZrtpNotSupported {
                call_id: CallId::new("A"),
            })
            .await;

        let call = manager.get_call(&CallId::new("A")).unwrap();
        let secure = call.secure().unwrap();
        assert!(secure.is_initialized());
        assert!(!secure.zrtp_supported());
        assert!(!secure.is_trusted());
        match events.recv().await.unwrap() {
            ServiceEvent::ZrtpNotSupported { call_id, conference, .. } => {
                assert_eq!(call_id.as_str(), "A");
                assert_eq!(conference.unwrap().id().as_str(), "A");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zrtp_negotiation_failure_is_recorded() {
        let (mut manager, _) = manager(permissive_daemon());
        ring(&mut manager, "A").await;
        manager.secure_zrtp_on(&CallId::new("A"), "AES-256".to_string()).unwrap();
        let mut events = manager.events.subscribe();

        manager
            .handle_callback(DaemonCallback::ZrtpNegotiationFailed {
                call_id: CallId::new("A"),
                reason: "hello timeout".to_string(),
                severity: "error".to_string(),
            })
            .await;

        let call = manager.get_call(&CallId::new("A")).unwrap();
        let secure = call.secure().unwrap();
        assert!(!secure.zrtp_supported());
        let failure = secure.failure().unwrap();
        assert_eq!(failure.reason, "hello timeout");
        assert_eq!(failure.severity, "error");
        match events.recv().await.unwrap() {
            ServiceEvent::ZrtpNegotiationFailed { reason, severity, .. } => {
                assert_eq!(reason, "hello timeout");
                assert_eq!(severity, "error");
            }
            other => panic!("unexpected event {:?}", other),
        }

        manager
            .handle_callback(DaemonCallback::ZrtpNegotiationFailed {
                call_id: CallId::new("ghost"),
                reason: "hello timeout".to_string(),
                severity: "error".to_string(),
            })
            .await;
        assert_eq!(manager.stats().unresolved_identifiers, 1);
    }

    #[tokio::test]
    async fn test_add_participant_rejects_single_call_target() {
        // No daemon expectation: the command must fail before reaching it
        let (mut manager, _) = manager(permissive_daemon());
        ring(&mut manager, "A").await;
        ring(&mut manager, "B").await;

        let err = manager
            .add_participant(&CallId::new("B"), &ConferenceId::new("A"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidOperation(_)));
        assert_eq!(manager.get_conference("A").unwrap().participant_count(), 1);
        assert_eq!(manager.get_conference("B").unwrap().participant_count(), 1);
    }

    #[tokio::test]
    async fn test_add_participant_moves_call_into_conference() {
        let mut daemon = permissive_daemon();
        daemon
            .expect_participant_list()
            .returning(|_| Ok(vec![CallId::new("A"), CallId::new("B")]));
        daemon.expect_add_participant().times(1).returning(|_, _| Ok(()));
        let (mut manager, _) = manager(daemon);
        for id in ["A", "B", "C"] {
            ring(&mut manager, id).await;
        }
        manager.conference_created(ConferenceId::new("conf-1")).await.unwrap();

        manager
            .add_participant(&CallId::new("C"), &ConferenceId::new("conf-1"))
            .await
            .unwrap();

        assert_eq!(manager.get_conference("conf-1").unwrap().participant_count(), 3);
        assert!(manager.registry().get("C").is_none());
    }
}
