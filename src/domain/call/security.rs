//! Secure transport (ZRTP) state of a call

use serde::{Deserialize, Serialize};

/// Negotiation failure reported by the ZRTP layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationFailure {
    pub reason: String,
    pub severity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureChannel {
    initialized: bool,
    zrtp_supported: bool,
    cipher: Option<String>,
    sas: Option<String>,
    sas_confirmed: bool,
    sas_verified_by_zrtp: bool,
    failure: Option<NegotiationFailure>,
}

impl SecureChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zrtp_on(&mut self, cipher: impl Into<String>) {
        self.initialized = true;
        self.zrtp_supported = true;
        self.cipher = Some(cipher.into());
    }

    pub fn zrtp_off(&mut self) {
        self.initialized = true;
        self.zrtp_supported = false;
        self.cipher = None;
    }

    pub fn show_sas(&mut self, sas: impl Into<String>, verified: bool) {
        self.sas = Some(sas.into());
        self.sas_verified_by_zrtp = verified;
    }

    pub fn not_supported(&mut self) {
        self.initialized = true;
        self.zrtp_supported = false;
    }

    pub fn negotiation_failed(&mut self, reason: impl Into<String>, severity: impl Into<String>) {
        self.initialized = true;
        self.zrtp_supported = false;
        self.failure = Some(NegotiationFailure {
            reason: reason.into(),
            severity: severity.into(),
        });
    }

    /// User confirmed the SAS out of band
    pub fn confirm_sas(&mut self) {
        self.sas_confirmed = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn zrtp_supported(&self) -> bool {
        self.zrtp_supported
    }

    pub fn cipher(&self) -> Option<&str> {
        self.cipher.as_deref()
    }

    pub fn sas(&self) -> Option<&str> {
        self.sas.as_deref()
    }

    pub fn sas_confirmed(&self) -> bool {
        self.sas_confirmed
    }

    pub fn sas_verified_by_zrtp(&self) -> bool {
        self.sas_verified_by_zrtp
    }

    pub fn failure(&self) -> Option<&NegotiationFailure> {
        self.failure.as_ref()
    }

    /// Media is protected and both ends agreed on the SAS
    pub fn is_trusted(&self) -> bool {
        self.zrtp_supported && (self.sas_confirmed || self.sas_verified_by_zrtp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zrtp_handshake() {
        let mut channel = SecureChannel::new();
        assert!(!channel.is_initialized());

        channel.zrtp_on("AES-CM-128");
        channel.show_sas("abcd", false);
        assert!(channel.is_initialized());
        assert_eq!(channel.cipher(), Some("AES-CM-128"));
        assert!(!channel.is_trusted());

        channel.confirm_sas();
        assert!(channel.is_trusted());
    }

    #[test]
    fn test_negotiation_failure_disables_zrtp() {
        let mut channel = SecureChannel::new();
        channel.zrtp_on("AES-CM-128");
        channel.negotiation_failed("hello timeout", "severe");

        assert!(!channel.zrtp_supported());
        assert_eq!(channel.failure().unwrap().reason, "hello timeout");
    }
}
