//! Offline cache controller: per-request interception and the activation protocol.

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::error::CacheError;
use super::policy::{is_cacheable, CachePolicy};
use super::routes::OfflineRoutes;
use super::storage::{CacheStorage, CachedResponse};
use super::types::{Fingerprint, Handled, Outcome, Request, Response};
use crate::net::{Connectivity, Transport};

/// Version identifier baked into the store name, e.g. a build hash or semver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVersion(String);

impl CacheVersion {
  pub fn new(version: impl Into<String>) -> Self {
    Self(version.into())
  }

  /// Store name for this version under the given prefix, e.g. `shakeguard-assets-v11`.
  pub fn store_name(&self, prefix: &str) -> String {
    format!("{}-{}", prefix, self.0)
  }
}

impl fmt::Display for CacheVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Static tables handed to the controller at construction.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  /// Base URL manifest paths are resolved against
  pub origin: Url,
  /// Store name prefix; the version is appended
  pub name: String,
  pub version: CacheVersion,
  /// Known-static paths pre-populated on activation, in order
  pub manifest: Vec<String>,
  pub policy: CachePolicy,
  pub offline_routes: OfflineRoutes,
}

/// What an activation did.
#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
  pub store: String,
  /// Stale stores that were deleted
  pub purged: Vec<String>,
  /// Manifest paths now present in the store
  pub cached: Vec<String>,
  /// Manifest paths that could not be cached, with the reason
  pub skipped: Vec<(String, String)>,
}

/// Intercepting cache controller.
///
/// Every call to [`OfflineCache::handle`] yields exactly one response. Concurrent
/// requests are independent; two misses on the same fingerprint both write and the
/// last write wins.
pub struct OfflineCache<S, T, C>
where
  S: CacheStorage,
  T: Transport,
  C: Connectivity,
{
  storage: Arc<S>,
  transport: T,
  connectivity: C,
  settings: CacheSettings,
  store_name: String,
}

impl<S, T, C> OfflineCache<S, T, C>
where
  S: CacheStorage + 'static,
  T: Transport,
  C: Connectivity,
{
  pub fn new(storage: S, transport: T, connectivity: C, settings: CacheSettings) -> Self {
    let store_name = settings.version.store_name(&settings.name);
    Self {
      storage: Arc::new(storage),
      transport,
      connectivity,
      settings,
      store_name,
    }
  }

  /// Name of the current-version store.
  pub fn store_name(&self) -> &str {
    &self.store_name
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn settings(&self) -> &CacheSettings {
    &self.settings
  }

  /// Produce the response for an intercepted request.
  ///
  /// 1. Non-GET or bodied requests go straight to the network (offline fallback on failure)
  /// 2. Cache hit - return it, no network call
  /// 3. Miss - fetch; store a 200 that passes the cacheability check
  /// 4. Offline or network failure - offline route table, else 503
  pub async fn handle(&self, request: &Request) -> Handled {
    if !request.is_cache_eligible() {
      return self.passthrough(request).await;
    }

    let fingerprint = request.fingerprint();
    match self.lookup(&fingerprint).await {
      Ok(Some(cached)) => {
        debug!(%fingerprint, cached_at = %cached.cached_at, "serving from cache");
        return Handled::new(cached.response, Outcome::Cached);
      }
      Ok(None) => {}
      Err(e) => {
        // Unreadable storage behaves like a miss
        warn!(%fingerprint, error = %e, "cache lookup failed");
      }
    }

    if !self.connectivity.is_online() {
      return self.offline_fallback(request);
    }

    match self.transport.fetch(request).await {
      Ok(response) if response.is_ok() => {
        if is_cacheable(&self.settings.policy, request, &response) {
          self.store(fingerprint, response.to_cached()).await;
          Handled::new(response, Outcome::Stored)
        } else {
          debug!(%fingerprint, "response not cacheable");
          Handled::new(response, Outcome::Uncached)
        }
      }
      Ok(response) => {
        debug!(%fingerprint, status = response.status, "returning non-200 response uncached");
        Handled::new(response, Outcome::AsIs)
      }
      Err(e) => {
        warn!(%fingerprint, error = %e, "fetch failed");
        self.offline_fallback(request)
      }
    }
  }

  async fn passthrough(&self, request: &Request) -> Handled {
    if !self.connectivity.is_online() {
      return self.offline_fallback(request);
    }

    match self.transport.fetch(request).await {
      Ok(response) => Handled::new(response, Outcome::NetworkPassthrough),
      Err(e) => {
        warn!(method = %request.method, url = %request.url, error = %e, "fetch failed");
        self.offline_fallback(request)
      }
    }
  }

  fn offline_fallback(&self, request: &Request) -> Handled {
    let response = self.settings.offline_routes.respond(request);
    debug!(path = request.path(), status = response.status, "offline fallback");
    Handled::new(response, Outcome::OfflineFallback)
  }

  /// Look up a fingerprint on the blocking pool so a busy store never stalls other requests.
  async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResponse>, CacheError> {
    let storage = Arc::clone(&self.storage);
    let store_name = self.store_name.clone();
    let fingerprint = fingerprint.clone();
    tokio::task::spawn_blocking(move || storage.match_request(&store_name, &fingerprint))
      .await
      .map_err(|e| CacheError::unavailable(format!("cache lookup task failed: {}", e)))?
  }

  /// Write a response on a detached blocking task.
  ///
  /// The write is not tied to the caller: if the request future is dropped the
  /// write still runs to completion. Failures are logged and dropped.
  async fn store(&self, fingerprint: Fingerprint, response: Response) {
    let storage = Arc::clone(&self.storage);
    let store_name = self.store_name.clone();
    let write = tokio::task::spawn_blocking(move || {
      storage
        .put(&store_name, &fingerprint, &response)
        .map(|()| fingerprint.clone())
        .map_err(|e| (fingerprint, e))
    });

    match write.await {
      Ok(Ok(fingerprint)) => debug!(%fingerprint, "stored in cache"),
      Ok(Err((fingerprint, e))) => warn!(%fingerprint, error = %e, "cache write dropped"),
      Err(e) => warn!(error = %e, "cache write task failed"),
    }
  }

  /// Run the version-purge protocol.
  ///
  /// Deletes every store other than the current one, opens the current store and
  /// pre-populates it from the manifest. Individual manifest failures are skipped;
  /// only a failure to purge or open the store is returned.
  pub async fn activate(&self) -> Result<ActivationReport, CacheError> {
    let purged = self
      .storage
      .retain_only(&self.store_name)
      .map_err(|e| CacheError::activation(&self.store_name, e))?;
    for name in &purged {
      info!(store = %name, "purged stale cache store");
    }

    self
      .storage
      .open(&self.store_name)
      .map_err(|e| CacheError::activation(&self.store_name, e))?;

    let results = join_all(
      self
        .settings
        .manifest
        .iter()
        .map(|path| async move { (path, self.precache(path).await) }),
    )
    .await;

    let mut report = ActivationReport {
      store: self.store_name.clone(),
      purged,
      ..Default::default()
    };
    for (path, result) in results {
      match result {
        Ok(()) => report.cached.push(path.clone()),
        Err(e) => {
          let e = CacheError::manifest_entry(path, e);
          warn!(error = %e, reason = %source_of(&e), "skipping manifest entry");
          report.skipped.push((path.clone(), source_of(&e)));
        }
      }
    }

    info!(
      store = %report.store,
      cached = report.cached.len(),
      skipped = report.skipped.len(),
      "cache store activated"
    );
    Ok(report)
  }

  async fn precache(&self, path: &str) -> Result<(), CacheError> {
    let url = self
      .settings
      .origin
      .join(path)
      .map_err(|source| CacheError::InvalidPath {
        path: path.to_string(),
        source,
      })?;
    let request = Request::get(url);

    let response = self.transport.fetch(&request).await?;
    if !response.is_ok() {
      return Err(CacheError::UnexpectedStatus {
        url: request.url.to_string(),
        status: response.status,
      });
    }

    let storage = Arc::clone(&self.storage);
    let store_name = self.store_name.clone();
    let fingerprint = request.fingerprint();
    let response = response.to_cached();
    tokio::task::spawn_blocking(move || storage.put(&store_name, &fingerprint, &response))
      .await
      .map_err(|e| CacheError::unavailable(format!("cache write task failed: {}", e)))?
  }
}

fn source_of(e: &CacheError) -> String {
  match std::error::Error::source(e) {
    Some(source) => source.to_string(),
    None => e.to_string(),
  }
}
