/// Conference domain model
///
/// A conference groups one or more calls into one addressable unit. Every
/// call lives in exactly one conference; a lone call is wrapped in a
/// single-call conference keyed by the call's own identifier.
use crate::domain::call::{Call, CallState};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{CallId, ConferenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multi-party conference state as reported by the daemon
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConferenceState {
    ActiveAttached,
    ActiveDetached,
    ActiveAttachedRec,
    ActiveDetachedRec,
    Hold,
    HoldRec,
}

impl ConferenceState {
    pub fn from_daemon(name: &str) -> Result<Self> {
        let state = match name {
            "ACTIVE_ATTACHED" => ConferenceState::ActiveAttached,
            "ACTIVE_DETACHED" => ConferenceState::ActiveDetached,
            "ACTIVE_ATTACHED_REC" => ConferenceState::ActiveAttachedRec,
            "ACTIVE_DETACHED_REC" => ConferenceState::ActiveDetachedRec,
            "HOLD" => ConferenceState::Hold,
            "HOLD_REC" => ConferenceState::HoldRec,
            other => {
                return Err(DomainError::UnknownState {
                    kind: "conference",
                    value: other.to_string(),
                })
            }
        };
        Ok(state)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceState::ActiveAttached => "ACTIVE_ATTACHED",
            ConferenceState::ActiveDetached => "ACTIVE_DETACHED",
            ConferenceState::ActiveAttachedRec => "ACTIVE_ATTACHED_REC",
            ConferenceState::ActiveDetachedRec => "ACTIVE_DETACHED_REC",
            ConferenceState::Hold => "HOLD",
            ConferenceState::HoldRec => "HOLD_REC",
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, ConferenceState::Hold | ConferenceState::HoldRec)
    }
}

impl fmt::Display for ConferenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text message exchanged during a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub incoming: bool,
    pub from: Option<String>,
    pub body: String,
    pub at: DateTime<Utc>,
}

impl TextMessage {
    pub fn incoming(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            incoming: true,
            from: Some(from.into()),
            body: body.into(),
            at: Utc::now(),
        }
    }

    pub fn outgoing(body: impl Into<String>) -> Self {
        Self {
            incoming: false,
            from: None,
            body: body.into(),
            at: Utc::now(),
        }
    }
}

/// Conference aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conference {
    id: ConferenceId,
    state: Option<ConferenceState>,
    participants: Vec<Call>,
    recording: bool,
    messages: Vec<TextMessage>,
    notification_id: i32,
    created_at: DateTime<Utc>,
}

impl Conference {
    /// Empty conference; the registry fills it before exposing it
    pub(crate) fn new(id: ConferenceId) -> Self {
        Self {
            id,
            state: None,
            participants: Vec::new(),
            recording: false,
            messages: Vec::new(),
            notification_id: rand::random(),
            created_at: Utc::now(),
        }
    }

    /// Wrap a lone call; the conference takes the call's identifier
    pub fn single(call: Call) -> Self {
        let mut conference = Self::new(ConferenceId::from(call.id()));
        conference.participants.push(call);
        conference
    }

    pub(crate) fn add_participant(&mut self, call: Call) {
        self.participants.push(call);
    }

    pub(crate) fn remove_participant(&mut self, call_id: &CallId) -> Option<Call> {
        let index = self.participants.iter().position(|c| c.id() == call_id)?;
        Some(self.participants.remove(index))
    }

    pub(crate) fn take_participants(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.participants)
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.participants.iter().any(|c| c.id() == call_id)
    }

    pub fn call(&self, call_id: &CallId) -> Option<&Call> {
        self.participants.iter().find(|c| c.id() == call_id)
    }

    pub(crate) fn call_mut(&mut self, call_id: &CallId) -> Option<&mut Call> {
        self.participants.iter_mut().find(|c| c.id() == call_id)
    }

    pub fn set_state(&mut self, state: ConferenceState) {
        self.state = Some(state);
    }

    pub fn add_message(&mut self, message: TextMessage) {
        self.messages.push(message);
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    // Getters
    pub fn id(&self) -> &ConferenceId {
        &self.id
    }

    pub fn participants(&self) -> &[Call] {
        &self.participants
    }

    pub fn participant_ids(&self) -> Vec<CallId> {
        self.participants.iter().map(|c| c.id().clone()).collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn conference_state(&self) -> Option<ConferenceState> {
        self.state
    }

    pub fn messages(&self) -> &[TextMessage] {
        &self.messages
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn notification_id(&self) -> i32 {
        self.notification_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// State name shown to the user: the call's own state for a lone call
    pub fn state_name(&self) -> &'static str {
        match self.participants.as_slice() {
            [only] => only.state().as_str(),
            _ => self.state.map(|s| s.as_str()).unwrap_or("NULL"),
        }
    }

    pub fn has_multiple_participants(&self) -> bool {
        self.participants.len() > 1
    }

    pub fn is_ringing(&self) -> bool {
        self.participants.first().is_some_and(|c| c.is_ringing())
    }

    pub fn is_incoming(&self) -> bool {
        matches!(self.participants.as_slice(), [only] if only.is_incoming())
    }

    pub fn is_on_hold(&self) -> bool {
        let lone_call_held = matches!(self.participants.as_slice(), [only] if only.state() == CallState::Hold);
        lone_call_held || self.state.is_some_and(|s| s.is_hold())
    }

    pub fn is_ongoing(&self) -> bool {
        match self.participants.as_slice() {
            [only] => only.is_ongoing(),
            [] => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::CallContact;
    use crate::domain::shared::value_objects::AccountId;

    fn call(id: &str) -> Call {
        Call::incoming(CallId::new(id), AccountId::new("acct1"), CallContact::unknown(id))
    }

    #[test]
    fn test_single_call_conference() {
        let conf = Conference::single(call("call-1"));

        assert_eq!(conf.id().as_str(), "call-1");
        assert_eq!(conf.participant_count(), 1);
        assert!(conf.is_ringing());
        assert!(conf.is_incoming());
        assert_eq!(conf.state_name(), "RINGING");
    }

    #[test]
    fn test_multi_party_state_name() {
        let mut conf = Conference::new(ConferenceId::new("conf-9"));
        conf.add_participant(call("call-1"));
        conf.add_participant(call("call-2"));
        assert_eq!(conf.state_name(), "NULL");

        conf.set_state(ConferenceState::HoldRec);
        assert_eq!(conf.state_name(), "HOLD_REC");
        assert!(conf.is_on_hold());
        assert!(conf.is_ongoing());
        assert!(!conf.is_incoming());
    }

    #[test]
    fn test_remove_participant() {
        let mut conf = Conference::new(ConferenceId::new("conf-9"));
        conf.add_participant(call("call-1"));
        conf.add_participant(call("call-2"));

        let removed = conf.remove_participant(&CallId::new("call-1")).unwrap();
        assert_eq!(removed.id().as_str(), "call-1");
        assert!(!conf.contains(&CallId::new("call-1")));
        assert!(conf.remove_participant(&CallId::new("call-1")).is_none());
    }

    #[test]
    fn test_conference_state_parsing() {
        assert_eq!(
            ConferenceState::from_daemon("ACTIVE_ATTACHED").unwrap(),
            ConferenceState::ActiveAttached
        );
        assert!(ConferenceState::from_daemon("ACTIVE").is_err());
    }
}
