//! Service events broadcast to the presentation layer

use crate::domain::call::CallState;
use crate::domain::conference::{Conference, TextMessage};
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Event raised after the registry reacted to a daemon callback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    CallStateChanged {
        call_id: CallId,
        state: CallState,
        /// Owning conference after the change; absent once the call ended
        conference: Option<Conference>,
        timestamp: i64,
    },
    IncomingCall {
        account: AccountId,
        call_id: CallId,
        conference: Conference,
        timestamp: i64,
    },
    IncomingText {
        target: String,
        message: TextMessage,
        conference: Option<Conference>,
        timestamp: i64,
    },
    ConferenceCreated {
        conf_id: ConferenceId,
        conference: Conference,
        timestamp: i64,
    },
    ConferenceRemoved {
        conf_id: ConferenceId,
        /// Single-call conferences the participants were moved to
        restored: Vec<ConferenceId>,
        timestamp: i64,
    },
    ConferenceChanged {
        conf_id: ConferenceId,
        state: String,
        conference: Option<Conference>,
        timestamp: i64,
    },
    RecordPlaybackFilepath {
        call_id: CallId,
        filename: String,
        timestamp: i64,
    },
    SecureZrtpOn {
        call_id: CallId,
        cipher: String,
        conference: Option<Conference>,
        timestamp: i64,
    },
    SecureZrtpOff {
        call_id: CallId,
        conference: Option<Conference>,
        timestamp: i64,
    },
    DisplaySas {
        call_id: CallId,
        sas: String,
        verified: bool,
        conference: Option<Conference>,
        timestamp: i64,
    },
    ZrtpNotSupported {
        call_id: CallId,
        conference: Option<Conference>,
        timestamp: i64,
    },
    ZrtpNegotiationFailed {
        call_id: CallId,
        reason: String,
        severity: String,
        conference: Option<Conference>,
        timestamp: i64,
    },
    /// Incoming call hung up while still ringing
    MissedCall {
        call_id: CallId,
        from: String,
        timestamp: i64,
    },
}

impl ServiceEvent {
    /// Same name as the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            ServiceEvent::CallStateChanged { .. } => "call_state_changed",
            ServiceEvent::IncomingCall { .. } => "incoming_call",
            ServiceEvent::IncomingText { .. } => "incoming_text",
            ServiceEvent::ConferenceCreated { .. } => "conference_created",
            ServiceEvent::ConferenceRemoved { .. } => "conference_removed",
            ServiceEvent::ConferenceChanged { .. } => "conference_changed",
            ServiceEvent::RecordPlaybackFilepath { .. } => "record_playback_filepath",
            ServiceEvent::SecureZrtpOn { .. } => "secure_zrtp_on",
            ServiceEvent::SecureZrtpOff { .. } => "secure_zrtp_off",
            ServiceEvent::DisplaySas { .. } => "display_sas",
            ServiceEvent::ZrtpNotSupported { .. } => "zrtp_not_supported",
            ServiceEvent::ZrtpNegotiationFailed { .. } => "zrtp_negotiation_failed",
            ServiceEvent::MissedCall { .. } => "missed_call",
        }
    }
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Event broadcaster
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<ServiceEvent>,
}

impl EventBroadcaster {
    /// Create new event broadcaster with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event; nobody listening is not an error
    pub fn broadcast(&self, event: ServiceEvent) {
        let kind = event.event_type();
        if self.tx.send(event).is_err() {
            debug!("No subscriber for {} event", kind);
        }
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = EventBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.broadcast(ServiceEvent::MissedCall {
            call_id: CallId::new("call-1"),
            from: "+15551234567".to_string(),
            timestamp: now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "missed_call");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::default();
        broadcaster.broadcast(ServiceEvent::RecordPlaybackFilepath {
            call_id: CallId::new("call-1"),
            filename: "/tmp/rec.wav".to_string(),
            timestamp: now(),
        });
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = ServiceEvent::MissedCall {
            call_id: CallId::new("call-1"),
            from: "bob".to_string(),
            timestamp: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "missed_call");
        assert_eq!(json["call_id"], "call-1");
    }

    #[test]
    fn test_event_type_matches_serialized_tag() {
        let events = vec![
            ServiceEvent::CallStateChanged {
                call_id: CallId::new("call-1"),
                state: CallState::Current,
                conference: None,
                timestamp: 0,
            },
            ServiceEvent::ConferenceRemoved {
                conf_id: ConferenceId::new("conf-1"),
                restored: Vec::new(),
                timestamp: 0,
            },
            ServiceEvent::ZrtpNegotiationFailed {
                call_id: CallId::new("call-1"),
                reason: "hello timeout".to_string(),
                severity: "error".to_string(),
                conference: None,
                timestamp: 0,
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }
}
