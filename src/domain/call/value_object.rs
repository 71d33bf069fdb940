//! Call value objects

use crate::domain::shared::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Call received from a remote peer
    Incoming,
    /// Call placed by the local user
    Outgoing,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Incoming => "incoming",
            CallDirection::Outgoing => "outgoing",
        }
    }
}

/// Call state as reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    None,
    Incoming,
    Connecting,
    Ringing,
    Current,
    Hold,
    Inactive,
    Hungup,
    Busy,
    Failure,
}

impl CallState {
    /// Parse a daemon state name.
    ///
    /// `UNHOLD` is a transition word rather than a state and maps to `CURRENT`.
    pub fn from_daemon(name: &str) -> Result<Self> {
        let state = match name {
            "NONE" => CallState::None,
            "INCOMING" => CallState::Incoming,
            "CONNECTING" => CallState::Connecting,
            "RINGING" => CallState::Ringing,
            "CURRENT" | "UNHOLD" => CallState::Current,
            "HOLD" => CallState::Hold,
            "INACTIVE" => CallState::Inactive,
            "HUNGUP" => CallState::Hungup,
            "BUSY" => CallState::Busy,
            "FAILURE" => CallState::Failure,
            other => {
                return Err(DomainError::UnknownState {
                    kind: "call",
                    value: other.to_string(),
                })
            }
        };
        Ok(state)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::None => "NONE",
            CallState::Incoming => "INCOMING",
            CallState::Connecting => "CONNECTING",
            CallState::Ringing => "RINGING",
            CallState::Current => "CURRENT",
            CallState::Hold => "HOLD",
            CallState::Inactive => "INACTIVE",
            CallState::Hungup => "HUNGUP",
            CallState::Busy => "BUSY",
            CallState::Failure => "FAILURE",
        }
    }

    /// Terminal states remove the call from the registry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Hungup | CallState::Busy | CallState::Failure)
    }

    /// Check whether a transition follows the usual daemon lifecycle.
    ///
    /// The daemon is authoritative, so callers only use this to flag drift.
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        if self == new_state {
            return true;
        }

        match (self, new_state) {
            // Nothing leaves a terminal state
            (Hungup | Busy | Failure, _) => false,

            (None | Incoming | Connecting, _) => true,

            (Ringing, Current) => true,
            (Ringing, Hungup | Busy | Failure) => true,

            (Current, Hold | Inactive) => true,
            (Current, Hungup | Busy | Failure) => true,

            (Hold, Current) => true,
            (Hold, Hungup | Failure) => true,

            (Inactive, Current | Hold) => true,
            (Inactive, Hungup | Failure) => true,

            _ => false,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
