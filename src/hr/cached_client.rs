//! Cached HR client that wraps HrClient with transparent caching.

use async_trait::async_trait;
use color_eyre::Result;

use crate::cache::{CacheLayer, CacheResult, CacheStorage};
use crate::search::PageSource;

use super::cache::DirectoryPage;
use super::client::HrClient;
use super::error::{HrError, HrResult};
use super::types::{Employee, EmployeeSummary, Page};

/// HR client with transparent caching support.
///
/// Employee reads go through the cache and fall back to stale copies when the
/// network is unavailable. Writes go straight to the inner client.
pub struct CachedHrClient<S: CacheStorage> {
  inner: HrClient,
  cache: CacheLayer<S>,
}

impl<S: CacheStorage> CachedHrClient<S> {
  pub fn new(inner: HrClient, cache: CacheLayer<S>) -> Self {
    Self { inner, cache }
  }

  /// The uncached client, for writes and binary downloads.
  pub fn inner(&self) -> &HrClient {
    &self.inner
  }

  /// Get a single employee record with caching.
  pub async fn get_employee(&self, id: u64) -> HrResult<CacheResult<Employee>> {
    self
      .cache
      .fetch_one(&id.to_string(), || {
        let inner = self.inner.clone();
        async move { inner.get_employee(id).await }
      })
      .await
  }

  /// Forget the cached record, e.g. after submitting changes to it.
  pub fn invalidate_employee(&self, id: u64) -> Result<()> {
    self.cache.invalidate::<Employee>(&id.to_string())
  }
}

// Directory pages are only reused while fresh. A stale page may no longer
// line up with the live listing, so a failed refresh aborts the scan.
#[async_trait]
impl<S: CacheStorage> PageSource<EmployeeSummary> for CachedHrClient<S> {
  async fn fetch_page(&self, offset: u64, limit: u64) -> HrResult<Page<EmployeeSummary>> {
    let result = self
      .cache
      .fetch_online(&DirectoryPage::key(offset, limit), || {
        let inner = self.inner.clone();
        async move {
          let page = inner.list_employees(offset, limit).await?;
          Ok::<_, HrError>(DirectoryPage {
            offset,
            limit,
            page,
          })
        }
      })
      .await?;

    Ok(result.data.page)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::config::ApiConfig;
  use crate::hr::types::Relation;
  use crate::session::Credential;

  fn unreachable_client() -> HrClient {
    let config = ApiConfig {
      url: "http://127.0.0.1:1".into(),
      timeout_secs: Some(5),
    };
    HrClient::new(&config).unwrap().with_credential(Credential {
      token: "t".into(),
      user_id: 1,
      employee_id: 7,
      is_manager: true,
      is_internal: true,
    })
  }

  #[tokio::test]
  async fn test_stale_directory_page_does_not_hide_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let seed = SqliteStorage::open_at(&path).unwrap();
    seed
      .store_entity(&DirectoryPage {
        offset: 0,
        limit: 50,
        page: Page {
          items: vec![EmployeeSummary {
            id: 3,
            name: "Ada".into(),
            job_title: None,
            department: Relation::Absent,
          }],
          total: 1,
        },
      })
      .unwrap();

    let cache = CacheLayer::new(SqliteStorage::open_at(&path).unwrap())
      .with_stale_time(chrono::Duration::seconds(-1));
    let client = CachedHrClient::new(unreachable_client(), cache);

    let err = client.fetch_page(0, 50).await.unwrap_err();
    assert!(matches!(err, HrError::Transport(_) | HrError::Timeout(_)));
  }
}
