//! Service counters
//!
//! Anomalies are exported through the `metrics` facade and mirrored in
//! `ServiceStats` so they can be read back without a recorder installed.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use serde::{Deserialize, Serialize};

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "ring_callbacks_total",
        "Total number of daemon callbacks processed"
    );
    describe_counter!(
        "ring_commands_total",
        "Total number of service commands processed"
    );
    describe_counter!(
        "ring_unresolved_identifiers_total",
        "Callbacks or commands naming a call or conference that is not registered"
    );
    describe_counter!(
        "ring_unknown_states_total",
        "State names received from the daemon that are not recognised"
    );
    describe_counter!(
        "ring_history_failures_total",
        "History entries that could not be persisted"
    );
    describe_counter!(
        "ring_callback_errors_total",
        "Callbacks that failed for another reason"
    );
    describe_gauge!(
        "ring_active_conferences",
        "Number of conferences currently registered"
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub callbacks: u64,
    pub commands: u64,
    pub unresolved_identifiers: u64,
    pub unknown_states: u64,
    pub history_written: u64,
    pub history_failures: u64,
    pub callback_errors: u64,
}

impl ServiceStats {
    pub(crate) fn record_callback(&mut self, name: &'static str) {
        self.callbacks += 1;
        counter!("ring_callbacks_total", "callback" => name).increment(1);
    }

    pub(crate) fn record_command(&mut self, name: &'static str) {
        self.commands += 1;
        counter!("ring_commands_total", "command" => name).increment(1);
    }

    pub(crate) fn record_unresolved(&mut self, source: &'static str, count: u64) {
        self.unresolved_identifiers += count;
        counter!("ring_unresolved_identifiers_total", "source" => source).increment(count);
    }

    pub(crate) fn record_unknown_state(&mut self, kind: &'static str) {
        self.unknown_states += 1;
        counter!("ring_unknown_states_total", "kind" => kind).increment(1);
    }

    pub(crate) fn record_history_written(&mut self) {
        self.history_written += 1;
    }

    pub(crate) fn record_history_failure(&mut self) {
        self.history_failures += 1;
        counter!("ring_history_failures_total").increment(1);
    }

    pub(crate) fn record_callback_error(&mut self, name: &'static str) {
        self.callback_errors += 1;
        counter!("ring_callback_errors_total", "callback" => name).increment(1);
    }
}

pub(crate) fn update_active_conferences(count: usize) {
    gauge!("ring_active_conferences").set(count as f64);
}
