//! Client for the remote HR REST API.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod error;
pub mod types;

pub use cached_client::CachedHrClient;
pub use client::HrClient;
pub use error::{HrError, HrResult};
