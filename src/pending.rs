//! Locally staged profile edits, kept per employee until submitted.
//!
//! Edits are held in a `ChangeSet` keyed by `ProfileField`. A present key
//! overrides the server value, even when the staged value is empty; an absent
//! key means "use whatever the server has". The set is written through to the
//! durable store on every change, so it survives restarts.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::hr::client::HrClient;
use crate::hr::error::HrError;
use crate::hr::types::{Employee, ProfileField};
use crate::store::KeyValueStore;

pub type ChangeSet = BTreeMap<ProfileField, String>;

const KEY_PREFIX: &str = "pending_profile_changes_";

/// What `PendingChanges::load` found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  /// Nothing stored for this employee
  Empty,
  /// Restored this many staged fields
  Loaded(usize),
  /// The stored entry was unreadable and has been discarded
  Recovered,
}

/// Staged edits for one employee.
pub struct PendingChanges<S: KeyValueStore> {
  store: S,
  employee_id: u64,
  changes: ChangeSet,
}

impl<S: KeyValueStore> PendingChanges<S> {
  /// Load the staged edits for `employee_id`.
  ///
  /// Unreadable data is never an error: the entry is dropped, the set starts
  /// empty and the outcome says `Recovered` so the caller can tell the user.
  pub fn load(store: S, employee_id: u64) -> Result<(Self, LoadOutcome)> {
    if employee_id == 0 {
      return Err(eyre!("Invalid employee id 0"));
    }

    let key = storage_key(employee_id);
    let (changes, outcome) = match store.get(&key)? {
      None => (ChangeSet::new(), LoadOutcome::Empty),
      Some(raw) => match serde_json::from_str::<ChangeSet>(&raw) {
        Ok(changes) => {
          let count = changes.len();
          (changes, LoadOutcome::Loaded(count))
        }
        Err(e) => {
          warn!(employee_id, error = %e, "discarding unreadable pending changes");
          // The next save overwrites the key anyway
          if let Err(e) = store.remove(&key) {
            warn!(employee_id, error = %e, "failed to remove unreadable pending changes");
          }
          (ChangeSet::new(), LoadOutcome::Recovered)
        }
      },
    };

    Ok((
      Self {
        store,
        employee_id,
        changes,
      },
      outcome,
    ))
  }

  pub fn employee_id(&self) -> u64 {
    self.employee_id
  }

  /// Merge `partial` into the staged set and persist the result.
  ///
  /// Last write wins per field. If the store write fails nothing changes.
  pub fn save(&mut self, partial: ChangeSet) -> Result<()> {
    if partial.is_empty() {
      return Ok(());
    }

    let mut merged = self.changes.clone();
    merged.extend(partial);

    let raw = serde_json::to_string(&merged)
      .map_err(|e| eyre!("Failed to serialize pending changes: {}", e))?;
    self.store.set(&storage_key(self.employee_id), &raw)?;

    debug!(employee_id = self.employee_id, fields = merged.len(), "pending changes saved");
    self.changes = merged;
    Ok(())
  }

  /// Stage a single field
  pub fn stage(&mut self, field: ProfileField, value: impl Into<String>) -> Result<()> {
    self.save(ChangeSet::from([(field, value.into())]))
  }

  /// Drop every staged edit, in memory and in the store.
  pub fn clear(&mut self) -> Result<()> {
    self.store.remove(&storage_key(self.employee_id))?;
    self.changes.clear();
    Ok(())
  }

  pub fn has_change(&self, field: ProfileField) -> bool {
    self.changes.contains_key(&field)
  }

  pub fn pending_value(&self, field: ProfileField) -> Option<&str> {
    self.changes.get(&field).map(String::as_str)
  }

  pub fn has_pending_changes(&self) -> bool {
    !self.changes.is_empty()
  }

  pub fn changed_fields(&self) -> Vec<ProfileField> {
    self.changes.keys().copied().collect()
  }

  pub fn changes(&self) -> &ChangeSet {
    &self.changes
  }

  /// Overlay staged values onto a server record.
  pub fn apply_to(&self, employee: &mut Employee) {
    for (field, value) in &self.changes {
      employee.details.set(*field, Some(value.clone()));
    }
  }

  /// Send the staged set to the server, clearing it only once accepted.
  ///
  /// On failure the staged edits are kept so nothing is lost.
  pub async fn submit(&mut self, client: &HrClient) -> Result<usize, SubmitError> {
    if self.changes.is_empty() {
      return Ok(0);
    }

    client
      .update_employee(self.employee_id, &self.changes)
      .await
      .map_err(SubmitError::Remote)?;

    let submitted = self.changes.len();
    self.clear().map_err(SubmitError::Local)?;
    Ok(submitted)
  }
}

/// Why a submission did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
  /// The server did not accept the changes; they are still staged
  #[error("submission rejected: {0}")]
  Remote(#[source] HrError),
  /// Accepted by the server, but clearing the local copy failed
  #[error("changes submitted but local copy could not be cleared: {0}")]
  Local(color_eyre::Report),
}

fn storage_key(employee_id: u64) -> String {
  format!("{}{}", KEY_PREFIX, employee_id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hr::types::{PersonalDetails, Relation};
  use crate::store::MemoryStore;
  use std::sync::Arc;

  /// Store whose writes always fail
  struct ReadOnlyStore;

  impl KeyValueStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Err(eyre!("read-only"))
    }

    fn remove(&self, _key: &str) -> Result<()> {
      Err(eyre!("read-only"))
    }
  }

  /// Store holding garbage that refuses to delete it
  struct StuckStore;

  impl KeyValueStore for StuckStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
      Ok(Some("{bad".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
      Ok(())
    }

    fn remove(&self, _key: &str) -> Result<()> {
      Err(eyre!("disk is read-only"))
    }
  }

  fn changes(pairs: &[(ProfileField, &str)]) -> ChangeSet {
    pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
  }

  #[test]
  fn test_load_empty() {
    let (buffer, outcome) = PendingChanges::load(MemoryStore::new(), 7).unwrap();
    assert_eq!(outcome, LoadOutcome::Empty);
    assert!(!buffer.has_pending_changes());
  }

  #[test]
  fn test_load_rejects_zero_id() {
    assert!(PendingChanges::load(MemoryStore::new(), 0).is_err());
  }

  #[test]
  fn test_empty_save_is_noop() {
    let store = Arc::new(MemoryStore::new());
    let (mut buffer, _) = PendingChanges::load(store.clone(), 7).unwrap();

    buffer.save(ChangeSet::new()).unwrap();
    assert!(store.is_empty());
    assert!(!buffer.has_pending_changes());

    buffer.stage(ProfileField::Marital, "married").unwrap();
    let before = store.get("pending_profile_changes_7").unwrap();
    buffer.save(ChangeSet::new()).unwrap();
    assert_eq!(store.get("pending_profile_changes_7").unwrap(), before);
    assert_eq!(buffer.changed_fields(), vec![ProfileField::Marital]);
  }

  #[test]
  fn test_save_merges_fields() {
    let store = Arc::new(MemoryStore::new());
    let (mut buffer, _) = PendingChanges::load(store.clone(), 7).unwrap();

    buffer
      .save(changes(&[(ProfileField::PrivateEmail, "a@example.com")]))
      .unwrap();
    buffer
      .save(changes(&[(ProfileField::PrivatePhone, "555")]))
      .unwrap();

    assert!(buffer.has_change(ProfileField::PrivateEmail));
    assert!(buffer.has_change(ProfileField::PrivatePhone));

    // Order of saves does not matter
    let (mut other, _) = PendingChanges::load(MemoryStore::new(), 8).unwrap();
    other
      .save(changes(&[(ProfileField::PrivatePhone, "555")]))
      .unwrap();
    other
      .save(changes(&[(ProfileField::PrivateEmail, "a@example.com")]))
      .unwrap();
    assert_eq!(other.changes(), buffer.changes());
  }

  #[test]
  fn test_last_write_wins() {
    let (mut buffer, _) = PendingChanges::load(MemoryStore::new(), 7).unwrap();
    buffer.stage(ProfileField::Children, "1").unwrap();
    buffer.stage(ProfileField::Children, "2").unwrap();
    assert_eq!(buffer.pending_value(ProfileField::Children), Some("2"));
  }

  #[test]
  fn test_empty_string_counts_as_change() {
    let (mut buffer, _) = PendingChanges::load(MemoryStore::new(), 7).unwrap();
    buffer.stage(ProfileField::Certificate, "").unwrap();
    assert!(buffer.has_change(ProfileField::Certificate));
    assert_eq!(buffer.pending_value(ProfileField::Certificate), Some(""));
    assert!(buffer.has_pending_changes());
  }

  #[test]
  fn test_persists_across_loads() {
    let store = Arc::new(MemoryStore::new());
    {
      let (mut buffer, _) = PendingChanges::load(store.clone(), 7).unwrap();
      buffer.stage(ProfileField::StudyField, "Physics").unwrap();
    }

    let (buffer, outcome) = PendingChanges::load(store.clone(), 7).unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded(1));
    assert_eq!(buffer.pending_value(ProfileField::StudyField), Some("Physics"));

    // Scoped per employee
    let (other, outcome) = PendingChanges::load(store, 8).unwrap();
    assert_eq!(outcome, LoadOutcome::Empty);
    assert!(!other.has_pending_changes());
  }

  #[test]
  fn test_clear_is_total() {
    let store = Arc::new(MemoryStore::new());
    let (mut buffer, _) = PendingChanges::load(store.clone(), 7).unwrap();
    buffer
      .save(changes(&[
        (ProfileField::Marital, "married"),
        (ProfileField::Children, "2"),
      ]))
      .unwrap();

    buffer.clear().unwrap();
    assert!(!buffer.has_pending_changes());
    assert!(buffer.changed_fields().is_empty());
    assert_eq!(store.get("pending_profile_changes_7").unwrap(), None);
  }

  #[test]
  fn test_corrupt_storage_recovers_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set("pending_profile_changes_7", "{\"marital\": ").unwrap();

    let (buffer, outcome) = PendingChanges::load(store.clone(), 7).unwrap();
    assert_eq!(outcome, LoadOutcome::Recovered);
    assert!(!buffer.has_pending_changes());
    assert_eq!(store.get("pending_profile_changes_7").unwrap(), None);
  }

  #[test]
  fn test_corrupt_storage_recovers_when_removal_fails() {
    let (mut buffer, outcome) = PendingChanges::load(StuckStore, 7).unwrap();
    assert_eq!(outcome, LoadOutcome::Recovered);
    assert!(!buffer.has_pending_changes());

    buffer.stage(ProfileField::Marital, "single").unwrap();
    assert_eq!(buffer.pending_value(ProfileField::Marital), Some("single"));
  }

  #[test]
  fn test_unknown_field_counts_as_corrupt() {
    let store = Arc::new(MemoryStore::new());
    store
      .set("pending_profile_changes_7", r#"{"salary": "1000000"}"#)
      .unwrap();

    let (_, outcome) = PendingChanges::load(store, 7).unwrap();
    assert_eq!(outcome, LoadOutcome::Recovered);
  }

  #[test]
  fn test_failed_write_leaves_state_unchanged() {
    let (mut buffer, _) = PendingChanges::load(ReadOnlyStore, 7).unwrap();
    assert!(buffer.stage(ProfileField::Marital, "married").is_err());
    assert!(!buffer.has_pending_changes());
  }

  #[test]
  fn test_apply_to_overlays_pending_values() {
    let (mut buffer, _) = PendingChanges::load(MemoryStore::new(), 7).unwrap();
    buffer.stage(ProfileField::Marital, "married").unwrap();
    buffer.stage(ProfileField::StudySchool, "").unwrap();

    let mut employee = Employee {
      id: 7,
      name: "Ada".into(),
      job_title: None,
      work_email: None,
      department: Relation::Absent,
      parent: Relation::Absent,
      child_ids: Vec::new(),
      image_url: None,
      details: PersonalDetails {
        marital: Some("single".into()),
        private_phone: Some("555".into()),
        study_school: Some("MIT".into()),
        ..Default::default()
      },
      write_date: None,
    };
    buffer.apply_to(&mut employee);

    assert_eq!(employee.details.get(ProfileField::Marital), Some("married"));
    assert_eq!(employee.details.get(ProfileField::PrivatePhone), Some("555"));
    assert_eq!(employee.details.get(ProfileField::StudySchool), Some(""));
  }

  #[test]
  fn test_profile_edit_flow() {
    let (mut buffer, outcome) = PendingChanges::load(MemoryStore::new(), 7).unwrap();
    assert_eq!(outcome, LoadOutcome::Empty);

    buffer
      .save(changes(&[(ProfileField::Marital, "married")]))
      .unwrap();
    assert_eq!(buffer.pending_value(ProfileField::Marital), Some("married"));
    assert!(!buffer.has_change(ProfileField::Children));

    buffer.clear().unwrap();
    assert!(!buffer.has_pending_changes());
  }

  #[tokio::test]
  async fn test_submit_empty_is_noop() {
    let config = crate::config::ApiConfig {
      url: "http://127.0.0.1:9".into(),
      timeout_secs: None,
    };
    let client = HrClient::new(&config).unwrap();
    let (mut buffer, _) = PendingChanges::load(MemoryStore::new(), 7).unwrap();
    assert_eq!(buffer.submit(&client).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_failed_submit_keeps_changes() {
    let config = crate::config::ApiConfig {
      url: "http://127.0.0.1:9".into(),
      timeout_secs: None,
    };
    // No credential: the request is refused before it reaches the network
    let client = HrClient::new(&config).unwrap();
    let store = Arc::new(MemoryStore::new());
    let (mut buffer, _) = PendingChanges::load(store.clone(), 7).unwrap();
    buffer.stage(ProfileField::Marital, "married").unwrap();

    let err = buffer.submit(&client).await.unwrap_err();
    assert!(matches!(err, SubmitError::Remote(HrError::Unauthenticated)));
    assert!(buffer.has_change(ProfileField::Marital));
    assert!(store.get("pending_profile_changes_7").unwrap().is_some());
  }
}
