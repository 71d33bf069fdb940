//! Commands accepted from the service-binding layer
//!
//! Each command carries a oneshot sender; the worker answers it once the
//! command ran to completion.

use crate::application::stats::ServiceStats;
use crate::domain::call::Call;
use crate::domain::conference::Conference;
use crate::domain::daemon::Details;
use crate::domain::history::HistoryEntry;
use crate::domain::shared::error::Result;
use crate::domain::shared::value_objects::{AccountId, CallId, ConferenceId};
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub enum Command {
    PlaceCall {
        account: AccountId,
        number: String,
        reply: Reply<CallId>,
    },
    Accept {
        call_id: CallId,
        reply: Reply<()>,
    },
    Refuse {
        call_id: CallId,
        reply: Reply<()>,
    },
    HangUp {
        call_id: CallId,
        reply: Reply<()>,
    },
    Hold {
        call_id: CallId,
        reply: Reply<()>,
    },
    Unhold {
        call_id: CallId,
        reply: Reply<()>,
    },
    CreateConference {
        sel_call: CallId,
        drag_call: CallId,
        reply: Reply<()>,
    },
    JoinConference {
        sel_conf: ConferenceId,
        drag_conf: ConferenceId,
        reply: Reply<()>,
    },
    AddParticipant {
        call_id: CallId,
        conf_id: ConferenceId,
        reply: Reply<()>,
    },
    DetachParticipant {
        call_id: CallId,
        reply: Reply<ConferenceId>,
    },
    HangUpConference {
        conf_id: ConferenceId,
        reply: Reply<()>,
    },
    HoldConference {
        conf_id: ConferenceId,
        reply: Reply<()>,
    },
    UnholdConference {
        conf_id: ConferenceId,
        reply: Reply<()>,
    },
    ToggleRecording {
        id: String,
        reply: Reply<bool>,
    },
    SendTextMessage {
        target: String,
        body: String,
        reply: Reply<()>,
    },
    ConfirmSas {
        call_id: CallId,
        reply: Reply<()>,
    },
    GetCall {
        call_id: CallId,
        reply: Reply<Call>,
    },
    GetConference {
        id: String,
        reply: Reply<Conference>,
    },
    ConcurrentCalls {
        reply: Reply<Vec<Conference>>,
    },
    CurrentCall {
        reply: Reply<Option<Conference>>,
    },
    CallDetails {
        call_id: CallId,
        reply: Reply<Details>,
    },
    ConferenceDetails {
        conf_id: ConferenceId,
        reply: Reply<String>,
    },
    ParticipantList {
        conf_id: ConferenceId,
        reply: Reply<Vec<CallId>>,
    },
    History {
        limit: usize,
        reply: Reply<Vec<HistoryEntry>>,
    },
    Stats {
        reply: Reply<ServiceStats>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::PlaceCall { .. } => "place_call",
            Command::Accept { .. } => "accept",
            Command::Refuse { .. } => "refuse",
            Command::HangUp { .. } => "hang_up",
            Command::Hold { .. } => "hold",
            Command::Unhold { .. } => "unhold",
            Command::CreateConference { .. } => "create_conference",
            Command::JoinConference { .. } => "join_conference",
            Command::AddParticipant { .. } => "add_participant",
            Command::DetachParticipant { .. } => "detach_participant",
            Command::HangUpConference { .. } => "hang_up_conference",
            Command::HoldConference { .. } => "hold_conference",
            Command::UnholdConference { .. } => "unhold_conference",
            Command::ToggleRecording { .. } => "toggle_recording",
            Command::SendTextMessage { .. } => "send_text_message",
            Command::ConfirmSas { .. } => "confirm_sas",
            Command::GetCall { .. } => "get_call",
            Command::GetConference { .. } => "get_conference",
            Command::ConcurrentCalls { .. } => "concurrent_calls",
            Command::CurrentCall { .. } => "current_call",
            Command::CallDetails { .. } => "call_details",
            Command::ConferenceDetails { .. } => "conference_details",
            Command::ParticipantList { .. } => "participant_list",
            Command::History { .. } => "history",
            Command::Stats { .. } => "stats",
        }
    }
}
