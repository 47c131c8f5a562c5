//! Offline-first request cache.
//!
//! This module provides the intercepting cache controller that:
//! - Serves bodiless GET requests from a named, versioned cache store
//! - Stores successful responses that pass the cacheability policy
//! - Answers from an offline route table (or a generic 503) when the network is gone
//! - Purges stale stores and pre-populates a manifest on activation

mod error;
mod layer;
mod policy;
mod routes;
mod storage;
mod types;

pub use error::CacheError;
pub use layer::{ActivationReport, CacheSettings, CacheVersion, OfflineCache};
pub use policy::{is_cacheable, CachePolicy};
pub use routes::{OfflineRoutes, UNAVAILABLE_BODY};
pub use storage::{CacheEntry, CacheStorage, CachedResponse, SqliteStorage};
pub use types::{Fingerprint, Handled, Headers, Outcome, Request, Response, ResponseKind};
