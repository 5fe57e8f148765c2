//! Authenticated resource acquisition with revocable local handles.
//!
//! A `ResourceAcquirer` turns an authorization-gated URL (e.g. an employee
//! avatar) into a `BlobHandle` that the host can read without ever seeing the
//! bearer credential. It follows the same fetch/poll shape as a query:
//!
//! ```ignore
//! let mut avatar = ResourceAcquirer::new(client.clone(), blobs.clone());
//! avatar.acquire(employee.image_url.as_deref());
//!
//! // In event loop tick
//! if avatar.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! match avatar.state() {
//!     AcquireState::Ready(Some(handle)) => render_image(blobs.read(handle)),
//!     AcquireState::Ready(None) | AcquireState::Failed(_) => render_placeholder(),
//!     AcquireState::Pending | AcquireState::Idle => {}
//! }
//! ```
//!
//! Only the most recent `acquire` is ever applied. A superseded request is
//! aborted, and if it already produced a handle that handle is revoked, so a
//! consumer never holds more than one live handle.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::hr::error::{HrError, HrResult};

/// Raw payload of a fetched resource
#[derive(Debug, Clone)]
pub struct FetchedBlob {
  pub bytes: Bytes,
  pub content_type: Option<String>,
}

/// Something that can read a protected resource with the current credential.
#[async_trait]
pub trait BlobSource: Send + Sync + 'static {
  async fn fetch(&self, url: &str) -> HrResult<FetchedBlob>;
}

/// Reference to bytes held in a `BlobStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
  id: u64,
  len: usize,
  content_type: Option<String>,
}

impl BlobHandle {
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Local address of the blob, e.g. `blob:hrdesk/3`
  pub fn uri(&self) -> String {
    format!("blob:hrdesk/{}", self.id)
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn content_type(&self) -> Option<&str> {
    self.content_type.as_deref()
  }
}

#[derive(Default)]
struct BlobStoreInner {
  next_id: u64,
  blobs: HashMap<u64, Bytes>,
}

/// Process-local registry of blobs. Every handle it creates stays live until
/// revoked. Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct BlobStore {
  inner: Arc<Mutex<BlobStoreInner>>,
}

impl BlobStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, BlobStoreInner> {
    // The map stays consistent even if a holder panicked
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn create(&self, blob: FetchedBlob) -> BlobHandle {
    let mut inner = self.lock();
    inner.next_id += 1;
    let id = inner.next_id;
    let handle = BlobHandle {
      id,
      len: blob.bytes.len(),
      content_type: blob.content_type,
    };
    inner.blobs.insert(id, blob.bytes);
    handle
  }

  /// Release the bytes behind `handle`. Returns false if it was already revoked.
  pub fn revoke(&self, handle: &BlobHandle) -> bool {
    self.lock().blobs.remove(&handle.id).is_some()
  }

  pub fn read(&self, handle: &BlobHandle) -> Option<Bytes> {
    self.lock().blobs.get(&handle.id).cloned()
  }

  /// Number of handles not yet revoked
  pub fn live_count(&self) -> usize {
    self.lock().blobs.len()
  }
}

impl std::fmt::Debug for BlobStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BlobStore")
      .field("live", &self.live_count())
      .finish()
  }
}

/// State of an acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireState {
  /// Nothing requested yet, or released
  Idle,
  Pending,
  /// `None` when no URL was given
  Ready(Option<BlobHandle>),
  Failed(HrError),
}

/// One consumer's view of a protected resource.
///
/// Holds at most one live handle at a time. Dropping the acquirer releases
/// the handle and cancels any request still in flight.
pub struct ResourceAcquirer<S: BlobSource> {
  source: Arc<S>,
  store: BlobStore,
  state: AcquireState,
  url: Option<String>,
  receiver: Option<mpsc::UnboundedReceiver<HrResult<BlobHandle>>>,
  task: Option<JoinHandle<()>>,
  timeout: Option<Duration>,
}

impl<S: BlobSource> ResourceAcquirer<S> {
  pub fn new(source: Arc<S>, store: BlobStore) -> Self {
    Self {
      source,
      store,
      state: AcquireState::Idle,
      url: None,
      receiver: None,
      task: None,
      timeout: None,
    }
  }

  /// Fail requests that take longer than `timeout`.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn state(&self) -> &AcquireState {
    &self.state
  }

  /// URL of the current request, if any
  pub fn url(&self) -> Option<&str> {
    self.url.as_deref()
  }

  pub fn handle(&self) -> Option<&BlobHandle> {
    match &self.state {
      AcquireState::Ready(handle) => handle.as_ref(),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&HrError> {
    match &self.state {
      AcquireState::Failed(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, AcquireState::Pending)
  }

  /// Request `url`, replacing whatever this consumer held before.
  ///
  /// An absent or empty URL settles immediately as `Ready(None)` without a
  /// network call.
  pub fn acquire(&mut self, url: Option<&str>) {
    self.cancel_in_flight();
    self.revoke_current();

    let url = match url.filter(|u| !u.is_empty()) {
      Some(url) => url.to_string(),
      None => {
        self.url = None;
        self.state = AcquireState::Ready(None);
        return;
      }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = AcquireState::Pending;
    self.url = Some(url.clone());

    let source = Arc::clone(&self.source);
    let store = self.store.clone();
    let timeout = self.timeout;
    self.task = Some(tokio::spawn(async move {
      let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, source.fetch(&url))
          .await
          .unwrap_or(Err(HrError::Timeout(limit))),
        None => source.fetch(&url).await,
      };

      let outcome = result.map(|blob| store.create(blob));
      // Receiver closed: this request was superseded after the handle existed
      if let Err(mpsc::error::SendError(Ok(orphan))) = tx.send(outcome) {
        debug!(url = %url, "revoking handle of superseded request");
        store.revoke(&orphan);
      }
    }));
  }

  /// Apply a settled result, if one arrived.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.apply(Some(result));
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.apply(None);
        true
      }
    }
  }

  /// Wait for the in-flight request to settle and apply it.
  pub async fn settled(&mut self) -> &AcquireState {
    if let Some(rx) = &mut self.receiver {
      let result = rx.recv().await;
      self.apply(result);
    }
    &self.state
  }

  /// Cancel any in-flight request and revoke every handle this consumer owns.
  pub fn release(&mut self) {
    self.cancel_in_flight();
    self.revoke_current();
    self.url = None;
    self.state = AcquireState::Idle;
  }

  fn apply(&mut self, result: Option<HrResult<BlobHandle>>) {
    self.receiver = None;
    self.task = None;
    self.state = match result {
      Some(Ok(handle)) => AcquireState::Ready(Some(handle)),
      Some(Err(e)) => {
        debug!(url = ?self.url, error = %e, "resource fetch failed");
        AcquireState::Failed(e)
      }
      // Sender dropped without sending
      None => AcquireState::Failed(HrError::Cancelled),
    };
  }

  fn cancel_in_flight(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }

    if let Some(mut rx) = self.receiver.take() {
      // Closing first makes any later send fail, so the task revokes its
      // own handle; anything already buffered is revoked here.
      rx.close();
      while let Ok(result) = rx.try_recv() {
        if let Ok(handle) = result {
          debug!(url = ?self.url, "revoking handle of superseded request");
          self.store.revoke(&handle);
        }
      }
    }
  }

  fn revoke_current(&mut self) {
    if let AcquireState::Ready(Some(handle)) = &self.state {
      self.store.revoke(handle);
      self.state = AcquireState::Idle;
    }
  }
}

impl<S: BlobSource> Drop for ResourceAcquirer<S> {
  fn drop(&mut self) {
    self.release();
  }
}

impl<S: BlobSource> std::fmt::Debug for ResourceAcquirer<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResourceAcquirer")
      .field("state", &self.state)
      .field("url", &self.url)
      .finish_non_exhaustive()
  }
}
