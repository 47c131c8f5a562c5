//! Error taxonomy for the offline cache.

use thiserror::Error;

/// Errors raised by the cache, its storage and the network transport.
///
/// Only [`CacheError::Activation`] ever reaches the host. Everything else is
/// recovered inside the controller and turned into a concrete response.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The fetch attempt was rejected (connection refused, DNS, timeout).
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// The storage service could not be read or written.
  #[error("cache storage unavailable: {0}")]
  CacheUnavailable(String),

  #[error("failed to encode cached response: {0}")]
  Encoding(#[from] serde_json::Error),

  #[error("unexpected status {status} for {url}")]
  UnexpectedStatus { url: String, status: u16 },

  #[error("invalid manifest path {path}: {source}")]
  InvalidPath {
    path: String,
    #[source]
    source: url::ParseError,
  },

  /// A single manifest entry could not be pre-populated.
  #[error("failed to cache manifest entry {path}")]
  ManifestEntry {
    path: String,
    #[source]
    source: Box<CacheError>,
  },

  /// The purge-and-open sequence failed; the previous version stays active.
  #[error("failed to activate cache store {store}")]
  Activation {
    store: String,
    #[source]
    source: Box<CacheError>,
  },
}

impl CacheError {
  pub fn unavailable(msg: impl Into<String>) -> Self {
    Self::CacheUnavailable(msg.into())
  }

  pub fn manifest_entry(path: &str, source: CacheError) -> Self {
    Self::ManifestEntry {
      path: path.to_string(),
      source: Box::new(source),
    }
  }

  pub fn activation(store: &str, source: CacheError) -> Self {
    Self::Activation {
      store: store.to_string(),
      source: Box::new(source),
    }
  }
}
