use color_eyre::{eyre::eyre, Report, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::Config;
use crate::hr::types::{Employee, EmployeeSummary, ProfileField};
use crate::hr::{CachedHrClient, HrClient, HrError};
use crate::pending::{LoadOutcome, PendingChanges, SubmitError};
use crate::resource::{AcquireState, BlobStore, ResourceAcquirer};
use crate::search::PaginatedSearch;
use crate::session::Session;
use crate::store::KeyValueStore;

/// Ties the session, API client, cache and local store together for one
/// command invocation.
pub struct App<K: KeyValueStore + Clone, S: CacheStorage> {
  config: Config,
  store: K,
  session: Session<K>,
  client: HrClient,
  cache: CacheLayer<S>,
}

impl<K: KeyValueStore + Clone, S: CacheStorage> App<K, S> {
  pub fn new(config: Config, store: K, cache: CacheLayer<S>) -> Result<Self> {
    let session = Session::init(store.clone())?;
    let client = HrClient::new(&config.api)?;

    Ok(Self {
      config,
      store,
      session,
      client,
      cache,
    })
  }

  /// Client carrying the session credential
  fn authed(&self) -> Result<HrClient> {
    let credential = self.session.require()?;
    Ok(self.client.clone().with_credential(credential.clone()))
  }

  fn cached(&self) -> Result<CachedHrClient<S>> {
    Ok(CachedHrClient::new(self.authed()?, self.cache.clone()))
  }

  fn pending(&self, employee_id: u64) -> Result<PendingChanges<K>> {
    let (pending, outcome) = PendingChanges::load(self.store.clone(), employee_id)?;
    if outcome == LoadOutcome::Recovered {
      println!("Note: locally staged changes were unreadable and have been discarded.");
    }
    Ok(pending)
  }

  fn own_employee_id(&self) -> Result<u64> {
    Ok(self.session.require()?.employee_id)
  }

  pub async fn login(&mut self, login: &str, password: &str) -> Result<()> {
    let credential = self
      .client
      .login(login, password)
      .await
      .map_err(|e| eyre!("Login failed: {}", e))?;
    let employee_id = credential.employee_id;
    self.session.establish(credential)?;
    println!("Logged in as employee {}", employee_id);
    Ok(())
  }

  pub fn logout(&mut self) -> Result<()> {
    self.session.teardown()?;
    println!("Logged out");
    Ok(())
  }

  pub fn whoami(&self) -> Result<()> {
    let credential = self.session.require()?;
    println!("user id:     {}", credential.user_id);
    println!("employee id: {}", credential.employee_id);
    println!("manager:     {}", yes_no(credential.is_manager));
    println!("internal:    {}", yes_no(credential.is_internal));
    Ok(())
  }

  /// Show the own profile with staged edits applied.
  pub async fn profile(&self) -> Result<()> {
    let employee_id = self.own_employee_id()?;
    let result = self
      .cached()?
      .get_employee(employee_id)
      .await
      .map_err(|e| load_error("profile", e))?;
    if result.is_offline() {
      println!("(offline: showing cached profile)");
    }

    let pending = self.pending(employee_id)?;
    let mut employee = result.data;
    pending.apply_to(&mut employee);
    print_profile(&employee, |field| pending.has_change(field));
    Ok(())
  }

  pub fn edit(&self, field: &str, value: &str) -> Result<()> {
    let field = ProfileField::parse(field).ok_or_else(|| {
      let valid: Vec<&str> = ProfileField::ALL.iter().map(|f| f.as_str()).collect();
      eyre!("Unknown field '{}'. Valid fields: {}", field, valid.join(", "))
    })?;

    let mut pending = self.pending(self.own_employee_id()?)?;
    pending.stage(field, value)?;
    println!("Staged {} (not yet submitted)", field);
    Ok(())
  }

  pub fn show_pending(&self) -> Result<()> {
    let pending = self.pending(self.own_employee_id()?)?;
    if !pending.has_pending_changes() {
      println!("No pending changes");
      return Ok(());
    }
    for (field, value) in pending.changes() {
      println!("{:<18} {}", field.as_str(), value);
    }
    Ok(())
  }

  pub fn discard(&self) -> Result<()> {
    let mut pending = self.pending(self.own_employee_id()?)?;
    let count = pending.changed_fields().len();
    pending.clear()?;
    println!("Discarded {} pending change(s)", count);
    Ok(())
  }

  pub async fn submit(&self) -> Result<()> {
    let employee_id = self.own_employee_id()?;
    let client = self.cached()?;
    let mut pending = self.pending(employee_id)?;

    match pending.submit(client.inner()).await {
      Ok(0) => println!("Nothing to submit"),
      Ok(count) => {
        if let Err(e) = client.invalidate_employee(employee_id) {
          warn!(error = %e, "failed to invalidate cached profile");
        }
        info!(employee_id, count, "pending changes submitted");
        println!("Submitted {} change(s)", count);
      }
      Err(e @ SubmitError::Remote(_)) => {
        return Err(eyre!("{}. Your changes are still staged.", e));
      }
      Err(e) => return Err(eyre!("{}", e)),
    }
    Ok(())
  }

  /// Download an employee's picture to `out`.
  pub async fn avatar(&self, employee_id: Option<u64>, out: &Path) -> Result<()> {
    let employee_id = match employee_id {
      Some(id) => id,
      None => self.own_employee_id()?,
    };
    let client = self.cached()?;
    let employee = client
      .get_employee(employee_id)
      .await
      .map_err(|e| load_error(&format!("employee {}", employee_id), e))?
      .data;

    let blobs = BlobStore::new();
    let mut acquirer = ResourceAcquirer::new(Arc::new(client.inner().clone()), blobs.clone());
    if let Some(secs) = self.config.api.timeout_secs {
      acquirer = acquirer.with_timeout(Duration::from_secs(secs));
    }

    acquirer.acquire(employee.image_url.as_deref());
    let result = match acquirer.settled().await {
      AcquireState::Ready(Some(handle)) => blobs
        .read(handle)
        .ok_or_else(|| eyre!("Image handle was released before it could be read")),
      AcquireState::Ready(None) => Err(eyre!("{} has no picture", employee.name)),
      AcquireState::Failed(e) => Err(eyre!("Failed to download picture: {}", e)),
      AcquireState::Pending | AcquireState::Idle => Err(eyre!("Picture download did not settle")),
    };
    acquirer.release();

    let bytes = result?;
    std::fs::write(out, &bytes).map_err(|e| eyre!("Failed to write {}: {}", out.display(), e))?;
    println!("Wrote {} bytes to {}", bytes.len(), out.display());
    Ok(())
  }

  /// List the manager's direct reports by scanning the directory.
  pub async fn team(&self, batches: u32) -> Result<()> {
    let credential = self.session.require()?;
    if !credential.is_manager {
      return Err(eyre!("The team view is only available to managers"));
    }

    let client = self.cached()?;
    let me = client
      .get_employee(credential.employee_id)
      .await
      .map_err(|e| load_error("profile", e))?
      .data;
    let reports: HashSet<u64> = me.child_ids.iter().copied().collect();
    if reports.is_empty() {
      println!("No direct reports");
      return Ok(());
    }

    let mut search: PaginatedSearch<EmployeeSummary> =
      PaginatedSearch::new(reports, self.config.team.page_size)
        .with_max_pages(self.config.team.max_pages_per_batch);
    search
      .load_first(&client)
      .await
      .map_err(|e| load_error("directory", e))?;

    let mut loaded = 1;
    while loaded < batches.max(1) && !search.is_exhausted() {
      if let Err(e) = search.load_more(&client).await {
        // Keep what we have; the next run retries from the start
        warn!(error = %e, "team search stopped early");
        println!("(search stopped early: {})", e);
        break;
      }
      loaded += 1;
    }

    for member in search.results() {
      println!(
        "{:>6}  {:<30} {:<25} {}",
        member.id,
        member.name,
        member.job_title.as_deref().unwrap_or("-"),
        member.department.label().unwrap_or("-"),
      );
    }
    if !search.is_exhausted() {
      println!("(more may be available; rerun with a higher --batches)");
    }
    Ok(())
  }
}

/// Turn a failed read into a user-facing error, pointing at `login` when the
/// server no longer accepts the stored credential.
fn load_error(what: &str, e: HrError) -> Report {
  if e.is_unauthorized() {
    eyre!("The server rejected your session. Run `hrdesk login <login>` again.")
  } else {
    eyre!("Failed to load {}: {}", what, e)
  }
}

fn yes_no(flag: bool) -> &'static str {
  if flag {
    "yes"
  } else {
    "no"
  }
}

fn print_profile(employee: &Employee, is_pending: impl Fn(ProfileField) -> bool) {
  println!("{} (#{})", employee.name, employee.id);
  if let Some(title) = &employee.job_title {
    println!("  {}", title);
  }
  if let Some(dept) = employee.department.label() {
    println!("  Department: {}", dept);
  }
  if let Some(manager) = employee.parent.label() {
    println!("  Manager:    {}", manager);
  }
  if let Some(email) = &employee.work_email {
    println!("  Work email: {}", email);
  }
  println!();
  for field in ProfileField::ALL {
    let marker = if is_pending(field) { "*" } else { " " };
    println!(
      "{} {:<18} {}",
      marker,
      field.as_str(),
      employee.details.get(field).unwrap_or("")
    );
  }
  println!();
  println!("* = staged locally, not yet submitted");
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;

  #[test]
  fn test_load_error_points_rejected_session_at_login() {
    let err = load_error(
      "profile",
      HrError::Status {
        status: StatusCode::UNAUTHORIZED,
        body: String::new(),
      },
    );
    assert!(err.to_string().contains("hrdesk login"));

    let err = load_error("profile", HrError::Transport("connection refused".into()));
    assert_eq!(err.to_string(), "Failed to load profile: transport error: connection refused");
  }
}
