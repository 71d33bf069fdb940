//! Call aggregate

use crate::domain::call::entity::CallContact;
use crate::domain::call::security::SecureChannel;
use crate::domain::call::value_object::{CallDirection, CallState};
use crate::domain::shared::value_objects::{AccountId, CallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of applying a daemon state to a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub previous: CallState,
    pub current: CallState,
}

impl StateTransition {
    pub fn is_noop(&self) -> bool {
        self.previous == self.current
    }
}

/// A single two-party leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    id: CallId,
    account: AccountId,
    contact: CallContact,
    direction: CallDirection,
    state: CallState,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    recording: bool,
    record_path: Option<String>,
    secure: Option<SecureChannel>,
}

impl Call {
    pub fn new(
        id: CallId,
        account: AccountId,
        contact: CallContact,
        direction: CallDirection,
        state: CallState,
    ) -> Self {
        Self {
            id,
            account,
            contact,
            direction,
            state,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            recording: false,
            record_path: None,
            secure: None,
        }
    }

    /// Incoming call, ringing from the start
    pub fn incoming(id: CallId, account: AccountId, contact: CallContact) -> Self {
        Self::new(id, account, contact, CallDirection::Incoming, CallState::Ringing)
    }

    /// Outgoing call, waiting for the daemon to report progress
    pub fn outgoing(id: CallId, account: AccountId, contact: CallContact) -> Self {
        Self::new(id, account, contact, CallDirection::Outgoing, CallState::None)
    }

    /// Enable the secure channel for calls on accounts using a secure layer
    pub fn with_secure_channel(mut self) -> Self {
        self.secure = Some(SecureChannel::new());
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Apply a daemon-reported state.
    ///
    /// Applying the current state again changes nothing.
    pub fn apply_state(&mut self, new_state: CallState) -> StateTransition {
        let previous = self.state;
        if previous == new_state {
            return StateTransition {
                previous,
                current: new_state,
            };
        }

        if !previous.can_transition_to(&new_state) {
            warn!(
                "Unexpected transition for call {}: {} -> {}",
                self.id, previous, new_state
            );
        }

        let now = Utc::now();
        if previous == CallState::Ringing && new_state == CallState::Current && self.answered_at.is_none() {
            self.answered_at = Some(now);
        }
        if new_state.is_terminal() {
            self.ended_at = Some(now);
        }
        self.state = new_state;

        StateTransition {
            previous,
            current: new_state,
        }
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn set_record_path(&mut self, path: impl Into<String>) {
        self.record_path = Some(path.into());
    }

    /// Secure channel, created on first use
    pub fn secure_mut(&mut self) -> &mut SecureChannel {
        self.secure.get_or_insert_with(SecureChannel::new)
    }

    // Getters
    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn contact(&self) -> &CallContact {
        &self.contact
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn answered_at(&self) -> Option<DateTime<Utc>> {
        self.answered_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn record_path(&self) -> Option<&str> {
        self.record_path.as_deref()
    }

    pub fn secure(&self) -> Option<&SecureChannel> {
        self.secure.as_ref()
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == CallDirection::Incoming
    }

    pub fn is_ringing(&self) -> bool {
        matches!(
            self.state,
            CallState::Ringing | CallState::Connecting | CallState::None | CallState::Incoming
        )
    }

    pub fn is_on_hold(&self) -> bool {
        self.state == CallState::Hold
    }

    pub fn is_ongoing(&self) -> bool {
        matches!(self.state, CallState::Current | CallState::Hold)
    }

    /// Talk time, once the call has been answered and ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.answered_at
            .and_then(|answered| self.ended_at.map(|ended| ended - answered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_call() -> Call {
        Call::incoming(
            CallId::new("call-1"),
            AccountId::new("acct1"),
            CallContact::unknown("+15551234567"),
        )
    }

    #[test]
    fn test_call_lifecycle() {
        let mut call = create_test_call();
        assert_eq!(call.state(), CallState::Ringing);
        assert!(call.is_ringing());

        let t = call.apply_state(CallState::Current);
        assert_eq!(t.previous, CallState::Ringing);
        assert!(call.answered_at().is_some());

        call.apply_state(CallState::Hold);
        assert!(call.is_on_hold());
        assert!(call.is_ongoing());

        call.apply_state(CallState::Current);
        call.apply_state(CallState::Hungup);
        assert!(call.ended_at().is_some());
        assert!(call.duration().is_some());
    }

    #[test]
    fn test_same_state_is_noop() {
        let mut call = create_test_call();
        call.apply_state(CallState::Current);
        let answered = call.answered_at();

        let t = call.apply_state(CallState::Current);
        assert!(t.is_noop());
        assert_eq!(call.answered_at(), answered);
    }

    #[test]
    fn test_missed_call_has_no_duration() {
        let mut call = create_test_call();
        call.apply_state(CallState::Hungup);
        assert!(call.answered_at().is_none());
        assert!(call.duration().is_none());
    }

    #[test]
    fn test_secure_channel_created_lazily() {
        let mut call = create_test_call();
        assert!(call.secure().is_none());
        call.secure_mut().zrtp_on("AES-CM-128");
        assert!(call.secure().unwrap().zrtp_supported());
    }
}
