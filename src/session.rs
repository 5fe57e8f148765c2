//! Session context: the credential issued at login and its persistence.
//!
//! A `Session` is created explicitly with `Session::init` and handed to
//! whatever needs the credential. There is no global session.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::store::KeyValueStore;

const SESSION_KEY: &str = "session";

/// Bearer credential and the identity it was issued for.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  pub token: String,
  pub user_id: u64,
  pub employee_id: u64,
  pub is_manager: bool,
  pub is_internal: bool,
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credential")
      .field("token", &"[REDACTED]")
      .field("user_id", &self.user_id)
      .field("employee_id", &self.employee_id)
      .field("is_manager", &self.is_manager)
      .field("is_internal", &self.is_internal)
      .finish()
  }
}

pub struct Session<S: KeyValueStore> {
  store: S,
  credential: Option<Credential>,
}

impl<S: KeyValueStore> Session<S> {
  /// Restore the persisted credential, if any.
  ///
  /// An unreadable entry is dropped and the session starts logged out.
  pub fn init(store: S) -> Result<Self> {
    let credential = match store.get(SESSION_KEY)? {
      Some(raw) => match serde_json::from_str::<Credential>(&raw) {
        Ok(credential) => Some(credential),
        Err(e) => {
          warn!(error = %e, "discarding unreadable stored session");
          if let Err(e) = store.remove(SESSION_KEY) {
            warn!(error = %e, "failed to remove unreadable stored session");
          }
          None
        }
      },
      None => None,
    };

    Ok(Self { store, credential })
  }

  /// Install a freshly issued credential, replacing any previous one.
  pub fn establish(&mut self, credential: Credential) -> Result<()> {
    let raw = serde_json::to_string(&credential)
      .map_err(|e| eyre!("Failed to serialize session: {}", e))?;
    self.store.set(SESSION_KEY, &raw)?;
    info!(
      employee_id = credential.employee_id,
      is_manager = credential.is_manager,
      "session established"
    );
    self.credential = Some(credential);
    Ok(())
  }

  pub fn credential(&self) -> Option<&Credential> {
    self.credential.as_ref()
  }

  /// The current credential, or an error telling the user to log in.
  pub fn require(&self) -> Result<&Credential> {
    self
      .credential
      .as_ref()
      .ok_or_else(|| eyre!("Not logged in. Run `hrdesk login <login>` first."))
  }

  pub fn is_authenticated(&self) -> bool {
    self.credential.is_some()
  }

  /// Log out: forget the credential in memory and in the store.
  pub fn teardown(&mut self) -> Result<()> {
    self.store.remove(SESSION_KEY)?;
    if let Some(previous) = self.credential.take() {
      info!(employee_id = previous.employee_id, "session cleared");
    }
    Ok(())
  }
}
