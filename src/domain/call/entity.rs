//! Call entities

use serde::{Deserialize, Serialize};

/// Remote party of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContact {
    /// Number or URI the daemon reported
    number: String,
    /// Display name
    display_name: Option<String>,
    /// Whether the contact was resolved from the directory
    known: bool,
}

impl CallContact {
    pub fn new(number: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            number: number.into(),
            display_name,
            known: true,
        }
    }

    /// Placeholder for a peer that is not in the contact directory
    pub fn unknown(from: impl Into<String>) -> Self {
        Self {
            number: from.into(),
            display_name: None,
            known: false,
        }
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    /// Display name, falling back to the raw number
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.number)
    }

    pub fn is_known(&self) -> bool {
        self.known
    }
}

/// Lookup of known contacts by number
pub trait ContactDirectory: Send + Sync {
    fn lookup(&self, number: &str) -> Option<CallContact>;

    /// Best-effort resolution; unknown peers get a placeholder.
    fn resolve(&self, from: &str) -> CallContact {
        self.lookup(from).unwrap_or_else(|| CallContact::unknown(from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneContact;

    impl ContactDirectory for OneContact {
        fn lookup(&self, number: &str) -> Option<CallContact> {
            (number == "+15551234567").then(|| CallContact::new(number, Some("Alice".to_string())))
        }
    }

    #[test]
    fn test_resolve_known_contact() {
        let contact = OneContact.resolve("+15551234567");
        assert!(contact.is_known());
        assert_eq!(contact.display_name(), "Alice");
    }

    #[test]
    fn test_resolve_unknown_contact() {
        let contact = OneContact.resolve("sip:bob@example.com");
        assert!(!contact.is_known());
        assert_eq!(contact.display_name(), "sip:bob@example.com");
    }
}
