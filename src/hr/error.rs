//! Error taxonomy for calls against the HR API.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single request against the HR API.
///
/// `Clone` so that a failed result can be held in consumer state
/// (see `resource::AcquireState`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HrError {
  /// Network unreachable, DNS failure, connection reset.
  #[error("transport error: {0}")]
  Transport(String),

  /// The server answered with a non-2xx status.
  #[error("server responded {status}: {body}")]
  Status { status: StatusCode, body: String },

  /// The server answered 2xx but the body was unreadable.
  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error("request timed out after {0:?}")]
  Timeout(std::time::Duration),

  /// Rejected locally before anything was sent.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("not logged in")]
  Unauthenticated,

  #[error("request was cancelled")]
  Cancelled,
}

impl HrError {
  /// HTTP status code, for protocol errors only.
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      HrError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether the server rejected the credential.
  pub fn is_unauthorized(&self) -> bool {
    matches!(
      self.status(),
      Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
    )
  }
}

impl From<reqwest::Error> for HrError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() || e.is_body() {
      HrError::Decode(e.to_string())
    } else {
      HrError::Transport(e.to_string())
    }
  }
}

impl From<serde_json::Error> for HrError {
  fn from(e: serde_json::Error) -> Self {
    HrError::Decode(e.to_string())
  }
}

pub type HrResult<T> = Result<T, HrError>;
