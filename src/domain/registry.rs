//! Conference registry
//!
//! Source of truth for every live call and conference. Calls are reachable
//! only through the conference that owns them; `owners` indexes each call
//! identifier to its owning conference and is updated together with
//! `conferences` in every mutation.

use crate::domain::call::Call;
use crate::domain::conference::Conference;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{CallId, ConferenceId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Structural changes produced by merging or reconciling a conference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Calls moved into the conference
    pub attached: Vec<CallId>,
    /// Calls moved out into their own single-call conference
    pub detached: Vec<CallId>,
    /// Identifiers the daemon listed that no conference holds
    pub unresolved: Vec<CallId>,
}

impl Reconciliation {
    pub fn is_unchanged(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// A call taken out of the registry
#[derive(Debug, Clone)]
pub struct RemovedCall {
    pub call: Call,
    pub conference_id: ConferenceId,
    /// The owning conference lost its last participant and was deleted
    pub conference_removed: bool,
}

#[derive(Debug, Default)]
pub struct ConferenceRegistry {
    conferences: HashMap<ConferenceId, Conference>,
    owners: HashMap<CallId, ConferenceId>,
}

impl ConferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conferences
    pub fn len(&self) -> usize {
        self.conferences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conferences.is_empty()
    }

    /// Number of calls across all conferences
    pub fn call_count(&self) -> usize {
        self.owners.len()
    }

    pub fn get(&self, id: &str) -> Option<&Conference> {
        self.conferences.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conference> {
        self.conferences.get_mut(id)
    }

    pub fn conferences(&self) -> impl Iterator<Item = &Conference> {
        self.conferences.values()
    }

    /// Resolve an identifier to a conference key: a direct conference key
    /// first, then the call index.
    pub fn resolve(&self, id: &str) -> Result<ConferenceId> {
        if self.conferences.contains_key(id) {
            return Ok(ConferenceId::new(id));
        }
        self.owners
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("call or conference {}", id)))
    }

    pub fn find_conference(&self, id: &str) -> Result<&Conference> {
        let key = self.resolve(id)?;
        self.conference(&key)
    }

    pub fn find_conference_mut(&mut self, id: &str) -> Result<&mut Conference> {
        let key = self.resolve(id)?;
        self.conference_mut(&key)
    }

    /// Conference owning the call
    pub fn owner_of(&self, call_id: &CallId) -> Result<&ConferenceId> {
        self.owners
            .get(call_id)
            .ok_or_else(|| DomainError::NotFound(format!("call {}", call_id)))
    }

    pub fn call(&self, call_id: &CallId) -> Result<&Call> {
        let owner = self.owner_of(call_id)?;
        self.conference(owner)?
            .call(call_id)
            .ok_or_else(|| index_drift(call_id, owner))
    }

    pub fn call_mut(&mut self, call_id: &CallId) -> Result<&mut Call> {
        let owner = self.owner_of(call_id)?.clone();
        self.conferences
            .get_mut(&owner)
            .and_then(|conf| conf.call_mut(call_id))
            .ok_or_else(|| index_drift(call_id, &owner))
    }

    /// Wrap a new call in its own single-call conference
    pub fn insert_call(&mut self, call: Call) -> Result<ConferenceId> {
        let call_id = call.id().clone();
        let key = ConferenceId::from(&call_id);
        if self.owners.contains_key(&call_id) || self.conferences.contains_key(&key) {
            return Err(DomainError::AlreadyExists(format!("call {}", call_id)));
        }

        self.conferences.insert(key.clone(), Conference::single(call));
        self.owners.insert(call_id, key.clone());
        debug!("Registered single-call conference {}", key);
        Ok(key)
    }

    /// Create a multi-party conference and migrate the listed calls into it.
    ///
    /// Fails without touching the registry when none of the participants
    /// can be found.
    pub fn create_conference(
        &mut self,
        conf_id: ConferenceId,
        participants: &[CallId],
    ) -> Result<Reconciliation> {
        if self.conferences.contains_key(&conf_id) {
            return Err(DomainError::AlreadyExists(format!("conference {}", conf_id)));
        }

        let (known, unresolved): (Vec<&CallId>, Vec<&CallId>) =
            dedup(participants).into_iter().partition(|id| self.owners.contains_key(*id));
        if known.is_empty() {
            return Err(DomainError::NotFound(format!(
                "no participant of conference {} is registered",
                conf_id
            )));
        }

        self.conferences.insert(conf_id.clone(), Conference::new(conf_id.clone()));
        let mut outcome = Reconciliation {
            unresolved: unresolved.into_iter().cloned().collect(),
            ..Default::default()
        };
        for call_id in known {
            self.attach(&conf_id, call_id)?;
            outcome.attached.push(call_id.clone());
        }

        info!(
            "Created conference {} with {} participants",
            conf_id,
            outcome.attached.len()
        );
        Ok(outcome)
    }

    /// Move a call from wherever it lives into `conf_id`.
    ///
    /// An emptied source conference is deleted.
    pub fn attach(&mut self, conf_id: &ConferenceId, call_id: &CallId) -> Result<()> {
        if !self.conferences.contains_key(conf_id) {
            return Err(DomainError::NotFound(format!("conference {}", conf_id)));
        }
        let source = self.owner_of(call_id)?.clone();
        if &source == conf_id {
            return Ok(());
        }

        let call = self.take_from(&source, call_id)?;
        if let Some(target) = self.conferences.get_mut(conf_id) {
            target.add_participant(call);
        }
        self.owners.insert(call_id.clone(), conf_id.clone());
        debug!("Attached call {} from {} to {}", call_id, source, conf_id);
        Ok(())
    }

    /// Move a call out of `conf_id` into its own single-call conference
    pub fn detach(&mut self, conf_id: &ConferenceId, call_id: &CallId) -> Result<ConferenceId> {
        let conference = self.conference(conf_id)?;
        if !conference.contains(call_id) {
            return Err(DomainError::NotFound(format!(
                "call {} in conference {}",
                call_id, conf_id
            )));
        }

        let key = ConferenceId::from(call_id);
        if &key == conf_id {
            if conference.participant_count() == 1 {
                return Ok(key);
            }
            return Err(DomainError::InvalidOperation(format!(
                "call {} keys conference {} and cannot be detached from it",
                call_id, conf_id
            )));
        }
        if self.conferences.contains_key(&key) {
            return Err(DomainError::AlreadyExists(format!("conference {}", key)));
        }

        let call = self.take_from(conf_id, call_id)?;
        self.conferences.insert(key.clone(), Conference::single(call));
        self.owners.insert(call_id.clone(), key.clone());
        debug!("Detached call {} from {}", call_id, conf_id);
        Ok(key)
    }

    /// Remove a call for good
    pub fn remove_call(&mut self, call_id: &CallId) -> Result<RemovedCall> {
        let conference_id = self.owner_of(call_id)?.clone();
        let call = self.take_from(&conference_id, call_id)?;
        self.owners.remove(call_id);
        let conference_removed = !self.conferences.contains_key(&conference_id);
        Ok(RemovedCall {
            call,
            conference_id,
            conference_removed,
        })
    }

    /// Delete a conference, re-wrapping each remaining call on its own
    pub fn dissolve(&mut self, conf_id: &ConferenceId) -> Result<Vec<ConferenceId>> {
        let conference = self.conference(conf_id)?;
        let ids = conference.participant_ids();
        if let Some(clash) = ids.iter().map(ConferenceId::from).find(|key| {
            key != conf_id && self.conferences.contains_key(key)
        }) {
            return Err(DomainError::AlreadyExists(format!("conference {}", clash)));
        }

        let mut conference = self
            .conferences
            .remove(conf_id)
            .ok_or_else(|| DomainError::NotFound(format!("conference {}", conf_id)))?;
        let mut keys = Vec::with_capacity(ids.len());
        for call in conference.take_participants() {
            let key = ConferenceId::from(call.id());
            self.owners.insert(call.id().clone(), key.clone());
            self.conferences.insert(key.clone(), Conference::single(call));
            keys.push(key);
        }

        info!("Dissolved conference {} into {} calls", conf_id, keys.len());
        Ok(keys)
    }

    /// Bring the membership of `conf_id` in line with the daemon's list.
    ///
    /// Calls the daemon lists but the conference lacks are attached; calls
    /// the conference holds but the daemon no longer lists are detached.
    /// Every move is checked before the first one is applied, so an error
    /// leaves the registry untouched.
    pub fn reconcile(
        &mut self,
        conf_id: &ConferenceId,
        authoritative: &[CallId],
    ) -> Result<Reconciliation> {
        let local: HashSet<CallId> = self.conference(conf_id)?.participant_ids().into_iter().collect();
        let remote = dedup(authoritative);
        let remote_set: HashSet<&CallId> = remote.iter().copied().collect();

        let mut outcome = Reconciliation::default();
        for call_id in remote.iter().copied().filter(|id| !local.contains(*id)) {
            if self.owners.contains_key(call_id) {
                outcome.attached.push(call_id.clone());
            } else {
                warn!(
                    "Conference {} lists unknown participant {}",
                    conf_id, call_id
                );
                outcome.unresolved.push(call_id.clone());
            }
        }

        let mut removed: Vec<CallId> = local
            .iter()
            .filter(|id| !remote_set.contains(id))
            .cloned()
            .collect();
        removed.sort();
        for call_id in &removed {
            self.check_detachable(conf_id, call_id, local.len(), &outcome.attached)?;
        }

        for call_id in &outcome.attached {
            self.attach(conf_id, call_id)?;
        }
        for call_id in removed {
            self.detach(conf_id, &call_id)?;
            outcome.detached.push(call_id);
        }

        if !outcome.is_unchanged() {
            info!(
                "Reconciled conference {}: +{} -{}",
                conf_id,
                outcome.attached.len(),
                outcome.detached.len()
            );
        }
        Ok(outcome)
    }

    /// Verify that every call belongs to exactly one non-empty conference
    /// and that the call index agrees with the conference contents.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen: HashMap<&CallId, &ConferenceId> = HashMap::new();
        for (key, conference) in &self.conferences {
            if key != conference.id() {
                return Err(DomainError::Internal(format!(
                    "conference {} stored under key {}",
                    conference.id(),
                    key
                )));
            }
            if conference.is_empty() {
                return Err(DomainError::Internal(format!("conference {} is empty", key)));
            }
            for call in conference.participants() {
                if let Some(other) = seen.insert(call.id(), key) {
                    return Err(DomainError::Internal(format!(
                        "call {} is held by both {} and {}",
                        call.id(),
                        other,
                        key
                    )));
                }
                if self.owners.get(call.id()) != Some(key) {
                    return Err(index_drift(call.id(), key));
                }
            }
        }
        if seen.len() != self.owners.len() {
            return Err(DomainError::Internal(format!(
                "call index holds {} entries for {} calls",
                self.owners.len(),
                seen.len()
            )));
        }
        Ok(())
    }

    /// Whether `call_id` can be detached from `conf_id` once `attaching`
    /// has moved in. Source conferences that the attaches empty are gone by
    /// then and do not count as key clashes.
    fn check_detachable(
        &self,
        conf_id: &ConferenceId,
        call_id: &CallId,
        local_count: usize,
        attaching: &[CallId],
    ) -> Result<()> {
        let key = ConferenceId::from(call_id);
        if &key == conf_id {
            if local_count == 1 && attaching.is_empty() {
                return Ok(());
            }
            return Err(DomainError::InvalidOperation(format!(
                "call {} keys conference {} and cannot be detached from it",
                call_id, conf_id
            )));
        }
        match self.conferences.get(&key) {
            Some(existing) if !existing.participants().iter().all(|c| attaching.contains(c.id())) => {
                Err(DomainError::AlreadyExists(format!("conference {}", key)))
            }
            _ => Ok(()),
        }
    }

    fn conference(&self, conf_id: &ConferenceId) -> Result<&Conference> {
        self.conferences
            .get(conf_id)
            .ok_or_else(|| DomainError::NotFound(format!("conference {}", conf_id)))
    }

    fn conference_mut(&mut self, conf_id: &ConferenceId) -> Result<&mut Conference> {
        self.conferences
            .get_mut(conf_id)
            .ok_or_else(|| DomainError::NotFound(format!("conference {}", conf_id)))
    }

    /// Pull a call out of a conference, deleting the conference if emptied.
    /// Leaves the index entry to the caller.
    fn take_from(&mut self, conf_id: &ConferenceId, call_id: &CallId) -> Result<Call> {
        let conference = self.conference_mut(conf_id)?;
        let call = conference
            .remove_participant(call_id)
            .ok_or_else(|| index_drift(call_id, conf_id))?;
        if conference.is_empty() {
            self.conferences.remove(conf_id);
            debug!("Removed empty conference {}", conf_id);
        }
        Ok(call)
    }
}

fn index_drift(call_id: &CallId, conf_id: &ConferenceId) -> DomainError {
    DomainError::Internal(format!(
        "call index points {} at {} but the conference does not hold it",
        call_id, conf_id
    ))
}

fn dedup(ids: &[CallId]) -> Vec<&CallId> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(*id)).collect()
}
