//! Self-service client for the HR portal API.
//!
//! The client-side pieces with real state to manage live here:
//! - [`resource`]: authenticated downloads exposed as revocable local handles
//! - [`pending`]: profile edits staged locally per employee until submitted
//! - [`search`]: scanning the paginated directory for a known set of ids
//!
//! [`app`] composes them with the session, the cached API client and the
//! local store for the `hrdesk` command.

pub mod app;
pub mod cache;
pub mod config;
pub mod hr;
pub mod pending;
pub mod resource;
pub mod search;
pub mod session;
pub mod store;
