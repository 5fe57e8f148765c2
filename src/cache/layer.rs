//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use super::storage::CacheStorage;
use super::traits::{CacheResult, Cacheable};
use crate::hr::error::HrError;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client,
/// providing transparent caching with offline support.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: chrono::DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.stale_time
  }

  /// Fetch a single entity with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return stale cache (offline mode)
  /// 4. Update cache with new data
  ///
  /// Cache storage problems are logged and never fail the call; only the
  /// network error is returned, when there is nothing cached to fall back on.
  pub async fn fetch_one<T, F, Fut>(
    &self,
    entity_key: &str,
    fetcher: F,
  ) -> Result<CacheResult<T>, HrError>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, HrError>>,
  {
    self.fetch(entity_key, fetcher, true).await
  }

  /// Like `fetch_one`, but a stale entry is never served in place of a
  /// failed fetch. Fresh entries are still returned without a request.
  pub async fn fetch_online<T, F, Fut>(
    &self,
    entity_key: &str,
    fetcher: F,
  ) -> Result<CacheResult<T>, HrError>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, HrError>>,
  {
    self.fetch(entity_key, fetcher, false).await
  }

  async fn fetch<T, F, Fut>(
    &self,
    entity_key: &str,
    fetcher: F,
    allow_offline: bool,
  ) -> Result<CacheResult<T>, HrError>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, HrError>>,
  {
    // A broken cache entry shouldn't block the network path
    let cached = self.storage.get_entity::<T>(entity_key).unwrap_or_else(|e| {
      warn!(entity_key, error = %e, "ignoring unreadable cache entry");
      None
    });

    if let Some(cached) = cached {
      if !self.is_stale(cached.cached_at) {
        // Cache is fresh
        return Ok(CacheResult::from_cache(cached.entity, cached.cached_at));
      }

      // Cache is stale, try to fetch from network
      match fetcher().await {
        Ok(data) => {
          self.store(&data);
          Ok(CacheResult::from_network(data))
        }
        // The server answered; serving a stale copy would hide its verdict
        Err(e @ HrError::Status { .. }) | Err(e @ HrError::Unauthenticated) => Err(e),
        Err(e) if !allow_offline => Err(e),
        Err(e) => {
          // Network failed, return stale cache (offline mode)
          warn!(entity_key, error = %e, "network unavailable, serving cached copy");
          Ok(CacheResult::offline(cached.entity, cached.cached_at))
        }
      }
    } else {
      // No cache, must fetch from network
      let data = fetcher().await?;
      self.store(&data);
      Ok(CacheResult::from_network(data))
    }
  }

  fn store<T: Cacheable>(&self, entity: &T) {
    if let Err(e) = self.storage.store_entity(entity) {
      warn!(key = %entity.cache_key(), error = %e, "failed to update cache");
    }
  }

  /// Forget a cached entity.
  pub fn invalidate<T: Cacheable>(&self, entity_key: &str) -> Result<()> {
    self.storage.remove_entity::<T>(entity_key)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      stale_time: self.stale_time,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{NoopStorage, SqliteStorage};
  use crate::cache::CacheSource;
  use reqwest::StatusCode;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Record {
    id: u64,
    version: u32,
  }

  impl Cacheable for Record {
    fn cache_key(&self) -> String {
      self.id.to_string()
    }

    fn entity_type() -> &'static str {
      "record"
    }
  }

  fn layer(dir: &tempfile::TempDir) -> CacheLayer<SqliteStorage> {
    CacheLayer::new(SqliteStorage::open_at(&dir.path().join("cache.db")).unwrap())
  }

  #[tokio::test]
  async fn test_miss_then_fresh_hit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir);

    let first = cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    let second = cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 99 }) })
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data.version, 1);
  }

  #[tokio::test]
  async fn test_stale_entry_served_offline_on_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir).with_stale_time(Duration::seconds(-1));

    cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();

    let result = cache
      .fetch_one::<Record, _, _>("1", || async {
        Err::<Record, _>(HrError::Transport("unreachable".into()))
      })
      .await
      .unwrap();
    assert!(result.is_offline());
    assert_eq!(result.data.version, 1);
  }

  #[tokio::test]
  async fn test_fetch_online_never_serves_stale_copy() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir).with_stale_time(Duration::seconds(-1));

    cache
      .fetch_online("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();

    let err = cache
      .fetch_online::<Record, _, _>("1", || async {
        Err::<Record, _>(HrError::Transport("unreachable".into()))
      })
      .await
      .unwrap_err();
    assert_eq!(err, HrError::Transport("unreachable".into()));

    // The stale copy is still there for callers that accept it
    let offline = cache
      .fetch_one::<Record, _, _>("1", || async {
        Err::<Record, _>(HrError::Transport("unreachable".into()))
      })
      .await
      .unwrap();
    assert!(offline.is_offline());
  }

  #[tokio::test]
  async fn test_fetch_online_serves_fresh_copy() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir);

    cache
      .fetch_online("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();
    let result = cache
      .fetch_online::<Record, _, _>("1", || async {
        Err::<Record, _>(HrError::Transport("unreachable".into()))
      })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::CacheFresh);
  }

  #[tokio::test]
  async fn test_stale_entry_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir).with_stale_time(Duration::seconds(-1));

    cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();
    let result = cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 2 }) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.version, 2);
  }

  #[tokio::test]
  async fn test_server_rejection_is_not_masked() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir).with_stale_time(Duration::seconds(-1));

    cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();

    let result = cache
      .fetch_one::<Record, _, _>("1", || async {
        Err::<Record, _>(HrError::Status {
          status: StatusCode::FORBIDDEN,
          body: String::new(),
        })
      })
      .await;
    assert!(matches!(result, Err(HrError::Status { .. })));
  }

  #[tokio::test]
  async fn test_invalidate_forces_network() {
    let dir = tempfile::tempdir().unwrap();
    let cache = layer(&dir);

    cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();
    cache.invalidate::<Record>("1").unwrap();

    let result = cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 2 }) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test]
  async fn test_noop_storage_always_fetches() {
    let cache = CacheLayer::new(NoopStorage);
    let result = cache
      .fetch_one("1", || async { Ok::<_, HrError>(Record { id: 1, version: 1 }) })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);

    let err = cache
      .fetch_one::<Record, _, _>("1", || async { Err::<Record, _>(HrError::Transport("down".into())) })
      .await
      .unwrap_err();
    assert!(matches!(err, HrError::Transport(_)));
  }
}
