//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::Cacheable;

/// A single cached entity.
#[derive(Debug, Clone)]
pub struct CachedEntity<T> {
  /// The cached entity
  pub entity: T,
  /// When the entity was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get a single entity by key.
  fn get_entity<T: Cacheable>(&self, entity_key: &str) -> Result<Option<CachedEntity<T>>>;

  /// Store a single entity.
  fn store_entity<T: Cacheable>(&self, entity: &T) -> Result<()>;

  /// Drop a cached entity so the next read goes to the network.
  fn remove_entity<T: Cacheable>(&self, entity_key: &str) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get_entity<T: Cacheable>(&self, _entity_key: &str) -> Result<Option<CachedEntity<T>>> {
    Ok(None) // Always miss
  }

  fn store_entity<T: Cacheable>(&self, _entity: &T) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove_entity<T: Cacheable>(&self, _entity_key: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache at `path`, creating it if needed.
  ///
  /// May share a database file with `store::SqliteStore`; the tables differ.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, entity_key)
);
"#;

impl CacheStorage for SqliteStorage {
  fn get_entity<T: Cacheable>(&self, entity_key: &str) -> Result<Option<CachedEntity<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entity_type = T::entity_type();

    let result: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM entity_cache
         WHERE entity_type = ? AND entity_key = ?",
        params![entity_type, entity_key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache: {}", e))?;

    match result {
      Some((data, cached_at_str)) => {
        let entity: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize entity: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedEntity { entity, cached_at }))
      }
      None => Ok(None),
    }
  }

  fn store_entity<T: Cacheable>(&self, entity: &T) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entity_type = T::entity_type();
    let key = entity.cache_key();
    let data =
      serde_json::to_vec(entity).map_err(|e| eyre!("Failed to serialize entity: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entity_cache (entity_type, entity_key, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![entity_type, key, data],
      )
      .map_err(|e| eyre!("Failed to store entity: {}", e))?;

    Ok(())
  }

  fn remove_entity<T: Cacheable>(&self, entity_key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM entity_cache WHERE entity_type = ? AND entity_key = ?",
        params![T::entity_type(), entity_key],
      )
      .map_err(|e| eyre!("Failed to remove entity: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
