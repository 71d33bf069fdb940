//! Callbacks delivered by the native daemon

use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};

/// One daemon notification, queued in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCallback {
    CallStateChanged {
        call_id: CallId,
        state: String,
    },
    IncomingCall {
        account: AccountId,
        call_id: CallId,
        from: String,
    },
    IncomingMessage {
        target: String,
        from: String,
        message: String,
    },
    ConferenceCreated {
        conf_id: ConferenceId,
    },
    ConferenceRemoved {
        conf_id: ConferenceId,
    },
    ConferenceStateChanged {
        conf_id: ConferenceId,
        state: String,
    },
    RecordPlaybackFilepath {
        call_id: CallId,
        filename: String,
    },
    SecureZrtpOn {
        call_id: CallId,
        cipher: String,
    },
    SecureZrtpOff {
        call_id: CallId,
    },
    ShowSas {
        call_id: CallId,
        sas: String,
        verified: bool,
    },
    ZrtpNotSupported {
        call_id: CallId,
    },
    ZrtpNegotiationFailed {
        call_id: CallId,
        reason: String,
        severity: String,
    },
}

impl DaemonCallback {
    pub fn call_state_changed(call_id: &str, state: &str) -> Self {
        DaemonCallback::CallStateChanged {
            call_id: CallId::new(call_id),
            state: state.to_string(),
        }
    }

    pub fn incoming_call(account: &str, call_id: &str, from: &str) -> Self {
        DaemonCallback::IncomingCall {
            account: AccountId::new(account),
            call_id: CallId::new(call_id),
            from: from.to_string(),
        }
    }

    pub fn incoming_message(target: &str, from: &str, message: &str) -> Self {
        DaemonCallback::IncomingMessage {
            target: target.to_string(),
            from: from.to_string(),
            message: message.to_string(),
        }
    }

    pub fn conference_created(conf_id: &str) -> Self {
        DaemonCallback::ConferenceCreated {
            conf_id: ConferenceId::new(conf_id),
        }
    }

    pub fn conference_removed(conf_id: &str) -> Self {
        DaemonCallback::ConferenceRemoved {
            conf_id: ConferenceId::new(conf_id),
        }
    }

    pub fn conference_state_changed(conf_id: &str, state: &str) -> Self {
        DaemonCallback::ConferenceStateChanged {
            conf_id: ConferenceId::new(conf_id),
            state: state.to_string(),
        }
    }

    /// Name used in logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            DaemonCallback::CallStateChanged { .. } => "call_state_changed",
            DaemonCallback::IncomingCall { .. } => "incoming_call",
            DaemonCallback::IncomingMessage { .. } => "incoming_message",
            DaemonCallback::ConferenceCreated { .. } => "conference_created",
            DaemonCallback::ConferenceRemoved { .. } => "conference_removed",
            DaemonCallback::ConferenceStateChanged { .. } => "conference_state_changed",
            DaemonCallback::RecordPlaybackFilepath { .. } => "record_playback_filepath",
            DaemonCallback::SecureZrtpOn { .. } => "secure_zrtp_on",
            DaemonCallback::SecureZrtpOff { .. } => "secure_zrtp_off",
            DaemonCallback::ShowSas { .. } => "show_sas",
            DaemonCallback::ZrtpNotSupported { .. } => "zrtp_not_supported",
            DaemonCallback::ZrtpNegotiationFailed { .. } => "zrtp_negotiation_failed",
        }
    }
}
