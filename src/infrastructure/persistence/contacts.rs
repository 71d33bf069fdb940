//! In-memory contact directory

use crate::domain::call::{CallContact, ContactDirectory};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryContactDirectory {
    contacts: RwLock<HashMap<String, CallContact>>,
}

impl MemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, number: &str, display_name: &str) {
        if let Ok(mut contacts) = self.contacts.write() {
            contacts.insert(
                number.to_string(),
                CallContact::new(number, Some(display_name.to_string())),
            );
        }
    }
}

impl ContactDirectory for MemoryContactDirectory {
    fn lookup(&self, number: &str) -> Option<CallContact> {
        self.contacts.read().ok()?.get(number).cloned()
    }
}
