//! Generic caching layer for data persistence and offline support.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Caches entities under an entity type + key
//! - Serves fresh entries without touching the network
//! - Provides basic offline mode (serve stale cache when network unavailable)

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
