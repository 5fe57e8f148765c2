//! Durable key/value storage.
//!
//! Backs the session credential and per-employee pending changes. Every
//! operation is a single atomic statement against the backing store, so a
//! read-modify-write done by a caller never leaves a half-written value.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use color_eyre::Result;

/// String key/value store that survives process restarts.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Insert or replace the value under `key`.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
  fn get(&self, key: &str) -> Result<Option<String>> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    (**self).set(key, value)
  }

  fn remove(&self, key: &str) -> Result<()> {
    (**self).remove(key)
  }
}
