//! Caching implementations for HR types.

use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

use super::types::{Employee, EmployeeSummary, Page};

impl Cacheable for Employee {
  fn cache_key(&self) -> String {
    self.id.to_string()
  }

  fn entity_type() -> &'static str {
    "employee"
  }
}

/// A directory page remembered together with the window it was fetched for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryPage {
  pub offset: u64,
  pub limit: u64,
  pub page: Page<EmployeeSummary>,
}

impl DirectoryPage {
  pub fn key(offset: u64, limit: u64) -> String {
    format!("{}:{}", offset, limit)
  }
}

impl Cacheable for DirectoryPage {
  fn cache_key(&self) -> String {
    Self::key(self.offset, self.limit)
  }

  fn entity_type() -> &'static str {
    "directory_page"
  }
}
