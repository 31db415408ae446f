use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::models::{SignatureAttempt, Step, attempt_key};

/// Per-visitor key/value record carried between requests.
///
/// Serialized as flat JSON into the `sessions` table; the id travels in a
/// cookie. Tracks whether it was modified so callers only write back when
/// needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    id: String,
    #[serde(default)]
    slots: BTreeMap<String, serde_json::Value>,
    /// One-shot notices, keyed by the slot they belong to.
    #[serde(default)]
    flash: BTreeMap<String, String>,
    #[serde(skip)]
    dirty: bool,
}

impl Session {
    /// Fresh session with a random id. New sessions count as modified so
    /// they get persisted.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            slots: BTreeMap::new(),
            flash: BTreeMap::new(),
            dirty: true,
        }
    }

    /// Rebuild a session from its stored record. The row id wins over any id
    /// embedded in the record.
    pub fn from_json(id: &str, json: &str) -> Result<Self> {
        let mut session: Session =
            serde_json::from_str(json).context("Failed to parse session record")?;
        session.id = id.to_string();
        session.dirty = false;
        Ok(session)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize session record")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// No slots and no pending flash.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.flash.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.slots.get(key)
    }

    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.slots.insert(key.to_string(), value);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.slots.remove(key).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn set_flash(&mut self, key: &str, message: impl Into<String>) {
        self.flash.insert(key.to_string(), message.into());
        self.dirty = true;
    }

    /// Take the pending flash notice for `key`, if any. It is shown once.
    pub fn take_flash(&mut self, key: &str) -> Option<String> {
        let flash = self.flash.remove(key);
        self.dirty |= flash.is_some();
        flash
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed container for in-progress signature attempts inside a [`Session`].
///
/// Knows nothing about steps beyond storing them: the wizard decides what an
/// attempt means.
#[derive(Debug, Default, Clone, Copy)]
pub struct WizardStateStore;

impl WizardStateStore {
    pub fn load(
        &self,
        session: &Session,
        signer_id: &str,
        initiative_id: i64,
    ) -> Option<SignatureAttempt> {
        let key = attempt_key(initiative_id, signer_id);
        let value = session.get(&key)?;
        match serde_json::from_value::<SignatureAttempt>(value.clone()) {
            Ok(attempt) => Some(attempt),
            Err(e) => {
                warn!(%key, error = %e, "discarding unreadable signature attempt");
                None
            }
        }
    }

    /// The stored attempt, or a fresh one at `first_step` when the signer has
    /// none yet. A fresh attempt is written back to the session.
    pub fn load_or_start(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
        first_step: Step,
        plan: &[Step],
    ) -> Result<SignatureAttempt> {
        match self.load(session, signer_id, initiative_id) {
            Some(attempt) => Ok(attempt),
            None => self.start(session, signer_id, initiative_id, first_step, plan),
        }
    }

    /// Replace whatever is stored with a fresh attempt at `first_step`.
    pub fn start(
        &self,
        session: &mut Session,
        signer_id: &str,
        initiative_id: i64,
        first_step: Step,
        plan: &[Step],
    ) -> Result<SignatureAttempt> {
        let mut fresh = SignatureAttempt::new(initiative_id, signer_id, plan);
        fresh.current_step = first_step;
        self.save(session, &fresh)?;
        Ok(fresh)
    }

    pub fn save(&self, session: &mut Session, attempt: &SignatureAttempt) -> Result<()> {
        let value = serde_json::to_value(attempt).context("Failed to serialize signature attempt")?;
        session.set(&attempt.key(), value);
        Ok(())
    }

    /// Drop the attempt together with any notice pending for it.
    pub fn clear(&self, session: &mut Session, signer_id: &str, initiative_id: i64) -> bool {
        let key = attempt_key(initiative_id, signer_id);
        session.take_flash(&key);
        session.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMS_PLAN: &[Step] = &[Step::SmsPhoneNumber, Step::SmsCode, Step::Finish];

    #[test]
    fn load_on_first_visit_is_none() {
        let session = Session::new();
        assert!(WizardStateStore.load(&session, "signer", 1).is_none());
    }

    #[test]
    fn load_or_start_begins_at_first_step_with_empty_fields() {
        let store = WizardStateStore;
        let mut session = Session::from_json("abc", "{}").unwrap();
        let attempt = store
            .load_or_start(&mut session, "signer", 3, Step::SmsPhoneNumber, SMS_PLAN)
            .unwrap();
        assert_eq!(attempt.current_step, Step::SmsPhoneNumber);
        assert!(attempt.extra_fields.is_empty());
        assert_eq!(attempt.plan, SMS_PLAN);
        assert!(session.is_dirty());
        assert_eq!(store.load(&session, "signer", 3), Some(attempt.clone()));

        let again = store
            .load_or_start(&mut session, "signer", 3, Step::SmsPhoneNumber, SMS_PLAN)
            .unwrap();
        assert_eq!(again, attempt);
    }

    #[test]
    fn saved_attempt_survives_session_persistence() {
        let store = WizardStateStore;
        let mut session = Session::new();
        let mut attempt = SignatureAttempt::new(4, "signer", SMS_PLAN);
        attempt.current_step = Step::SmsCode;
        attempt.phone_number = Some("+34600000001".into());
        attempt.sms_code_reference = Some("ref-1".into());
        store.save(&mut session, &attempt).unwrap();

        let json = session.to_json().unwrap();
        let restored = Session::from_json(session.id(), &json).unwrap();
        assert!(!restored.is_dirty());
        assert_eq!(store.load(&restored, "signer", 4), Some(attempt));
    }

    #[test]
    fn attempts_are_keyed_by_signer_and_initiative() {
        let store = WizardStateStore;
        let mut session = Session::new();
        store
            .save(&mut session, &SignatureAttempt::new(1, "alice", SMS_PLAN))
            .unwrap();
        assert!(store.load(&session, "alice", 1).is_some());
        assert!(store.load(&session, "alice", 2).is_none());
        assert!(store.load(&session, "bob", 1).is_none());
    }

    #[test]
    fn clear_removes_only_that_attempt() {
        let store = WizardStateStore;
        let mut session = Session::new();
        store
            .save(&mut session, &SignatureAttempt::new(1, "alice", SMS_PLAN))
            .unwrap();
        store
            .save(&mut session, &SignatureAttempt::new(2, "alice", SMS_PLAN))
            .unwrap();
        assert!(store.clear(&mut session, "alice", 1));
        assert!(!store.clear(&mut session, "alice", 1));
        assert!(store.load(&session, "alice", 1).is_none());
        assert!(store.load(&session, "alice", 2).is_some());
    }

    #[test]
    fn unreadable_slot_is_treated_as_absent() {
        let mut session = Session::new();
        session.set(
            &attempt_key(1, "alice"),
            serde_json::json!({"current_step": "teleport"}),
        );
        assert!(WizardStateStore.load(&session, "alice", 1).is_none());
    }

    #[test]
    fn flash_is_shown_once() {
        let mut session = Session::from_json("abc", "{}").unwrap();
        assert!(session.take_flash("a").is_none());
        assert!(!session.is_dirty());
        session.set_flash("a", "Request a new code");
        assert_eq!(session.take_flash("a").as_deref(), Some("Request a new code"));
        assert!(session.take_flash("a").is_none());
    }

    #[test]
    fn flash_belongs_to_its_key() {
        let mut session = Session::new();
        session.set_flash(&attempt_key(1, "alice"), "Request a new code");
        assert!(session.take_flash(&attempt_key(2, "alice")).is_none());
        assert!(!session.is_empty());
        assert!(session.take_flash(&attempt_key(1, "alice")).is_some());
    }

    #[test]
    fn clear_drops_pending_flash() {
        let store = WizardStateStore;
        let mut session = Session::new();
        store
            .save(&mut session, &SignatureAttempt::new(1, "alice", SMS_PLAN))
            .unwrap();
        session.set_flash(&attempt_key(1, "alice"), "notice");
        store.clear(&mut session, "alice", 1);
        assert!(session.is_empty());
    }

    #[test]
    fn from_json_keeps_row_id() {
        let session = Session::from_json("row-id", r#"{"id": "other", "slots": {}}"#).unwrap();
        assert_eq!(session.id(), "row-id");
    }
}
