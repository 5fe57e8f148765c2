//! Search a paginated remote listing for members of a known id set.
//!
//! The HR API only exposes the employee directory through offset/limit
//! pages, so finding a manager's reports means scanning pages and keeping
//! the rows whose id is in the team. `fetch_next_matching_batch` scans until
//! a page yields matches or the listing runs out; `PaginatedSearch` keeps the
//! cursor and accumulated results across "load more" calls.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

use crate::hr::error::{HrError, HrResult};
use crate::hr::types::{EmployeeSummary, Page};

/// Default bound on page fetches per batch
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// A remote collection readable by offset and limit.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
  async fn fetch_page(&self, offset: u64, limit: u64) -> HrResult<Page<T>>;
}

/// Items that carry a numeric id
pub trait Identified {
  fn id(&self) -> u64;
}

impl Identified for EmployeeSummary {
  fn id(&self) -> u64 {
    self.id
  }
}

/// Position of a search in the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCursor<T> {
  /// Offset of the next page to fetch
  pub offset: u64,
  /// False once the listing is exhausted
  pub more: bool,
  /// Matches accumulated so far
  pub results: Vec<T>,
}

impl<T> Default for SearchCursor<T> {
  fn default() -> Self {
    Self {
      offset: 0,
      more: true,
      results: Vec::new(),
    }
  }
}

/// Outcome of one `fetch_next_matching_batch` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
  pub matches: Vec<T>,
  /// Offset after the last page fetched
  pub offset: u64,
  /// Whether pages remain past `offset`
  pub more: bool,
  /// Number of page requests issued
  pub pages_fetched: u32,
}

/// Scan pages from `offset` until one contains a target id or the listing ends.
///
/// At most `max_pages` pages are fetched; if that bound is hit first the
/// batch comes back empty with the progressed offset and `more` still set,
/// so the caller can continue from there. An empty `target_ids` scans to the
/// end and returns nothing. Nothing is returned on error, leaving the
/// caller's cursor where it was.
pub async fn fetch_next_matching_batch<T, P>(
  source: &P,
  offset: u64,
  target_ids: &HashSet<u64>,
  page_size: u64,
  max_pages: u32,
) -> HrResult<Batch<T>>
where
  T: Identified + Send,
  P: PageSource<T> + ?Sized,
{
  if page_size == 0 {
    return Err(HrError::InvalidRequest("page size must be positive".into()));
  }

  let mut offset = offset;
  let mut pages_fetched = 0u32;

  loop {
    let page = source.fetch_page(offset, page_size).await?;
    pages_fetched += 1;
    offset += page_size;

    let matches: Vec<T> = page
      .items
      .into_iter()
      .filter(|item| target_ids.contains(&item.id()))
      .collect();

    let more = offset < page.total;
    if !matches.is_empty() || !more || pages_fetched >= max_pages.max(1) {
      debug!(
        offset,
        total = page.total,
        matches = matches.len(),
        pages_fetched,
        "search batch finished"
      );
      return Ok(Batch {
        matches,
        offset,
        more,
        pages_fetched,
      });
    }
  }
}

/// Accumulating search over a paginated listing.
///
/// `load_first` replaces the results, `load_more` appends to them. Both take
/// `&mut self`, so overlapping calls on one cursor can't happen.
pub struct PaginatedSearch<T> {
  targets: HashSet<u64>,
  cursor: SearchCursor<T>,
  page_size: u64,
  max_pages: u32,
}

impl<T: Identified + Send> PaginatedSearch<T> {
  pub fn new(targets: HashSet<u64>, page_size: u64) -> Self {
    Self {
      targets,
      cursor: SearchCursor::default(),
      page_size,
      max_pages: DEFAULT_MAX_PAGES,
    }
  }

  pub fn with_max_pages(mut self, max_pages: u32) -> Self {
    self.max_pages = max_pages;
    self
  }

  pub fn targets(&self) -> &HashSet<u64> {
    &self.targets
  }

  /// Replace the target set. A different set restarts the search.
  pub fn set_targets(&mut self, targets: HashSet<u64>) {
    if targets != self.targets {
      self.targets = targets;
      self.cursor = SearchCursor::default();
    }
  }

  pub fn cursor(&self) -> &SearchCursor<T> {
    &self.cursor
  }

  pub fn results(&self) -> &[T] {
    &self.cursor.results
  }

  pub fn is_exhausted(&self) -> bool {
    !self.cursor.more
  }

  /// Start over from the first page, replacing any results.
  ///
  /// Returns the number of matches found.
  pub async fn load_first<P>(&mut self, source: &P) -> HrResult<usize>
  where
    P: PageSource<T> + ?Sized,
  {
    let batch = fetch_next_matching_batch(
      source,
      0,
      &self.targets,
      self.page_size,
      self.max_pages,
    )
    .await?;

    let found = batch.matches.len();
    self.cursor = SearchCursor {
      offset: batch.offset,
      more: batch.more,
      results: batch.matches,
    };
    Ok(found)
  }

  /// Fetch the next batch and append it. A no-op once exhausted.
  pub async fn load_more<P>(&mut self, source: &P) -> HrResult<usize>
  where
    P: PageSource<T> + ?Sized,
  {
    if !self.cursor.more {
      return Ok(0);
    }

    let batch = fetch_next_matching_batch(
      source,
      self.cursor.offset,
      &self.targets,
      self.page_size,
      self.max_pages,
    )
    .await?;

    let found = batch.matches.len();
    self.cursor.offset = batch.offset;
    self.cursor.more = batch.more;
    self.cursor.results.extend(batch.matches);
    Ok(found)
  }
}
