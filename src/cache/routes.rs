//! Offline route table: synthetic responses for when both cache and network fail.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::policy::normalize_path;
use super::types::{Request, Response};

/// Body of the generic 503 reply. Deliberately distinct from the per-route "offline" sentinel.
pub const UNAVAILABLE_BODY: &str = "Service Unavailable";

/// Synchronous responder. Must not touch the network or the cache.
pub type Responder = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Maps URL paths to synthetic offline responses.
#[derive(Clone, Default)]
pub struct OfflineRoutes {
  routes: HashMap<String, Responder>,
}

impl OfflineRoutes {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a responder for `path`, replacing any previous one.
  pub fn insert<F>(&mut self, path: &str, responder: F)
  where
    F: Fn(&Request) -> Response + Send + Sync + 'static,
  {
    self.routes.insert(normalize_path(path), Arc::new(responder));
  }

  /// Register a fixed response for `path`.
  pub fn insert_static(&mut self, path: &str, response: Response) {
    self.insert(path, move |_| response.clone());
  }

  pub fn contains(&self, path: &str) -> bool {
    self.routes.contains_key(&normalize_path(path))
  }

  pub fn len(&self) -> usize {
    self.routes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }

  /// Answer an offline request: the route's responder if one exists, else a generic 503.
  pub fn respond(&self, request: &Request) -> Response {
    match self.routes.get(&normalize_path(request.path())) {
      Some(responder) => responder(request),
      None => unavailable(),
    }
  }
}

impl fmt::Debug for OfflineRoutes {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut paths: Vec<&String> = self.routes.keys().collect();
    paths.sort();
    f.debug_struct("OfflineRoutes").field("paths", &paths).finish()
  }
}

pub fn unavailable() -> Response {
  Response::text(503, UNAVAILABLE_BODY)
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn request(method: Method, path: &str) -> Request {
    Request::new(
      method,
      Url::parse("http://localhost:8000").unwrap().join(path).unwrap(),
    )
  }

  #[test]
  fn test_registered_route_answers() {
    let mut routes = OfflineRoutes::new();
    routes.insert_static("/login", Response::text(200, "offline"));

    let resp = routes.respond(&request(Method::POST, "/login"));
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_text(), "offline");
  }

  #[test]
  fn test_unmapped_route_gets_503() {
    let routes = OfflineRoutes::new();

    let resp = routes.respond(&request(Method::GET, "/some-unmapped-path"));
    assert_eq!(resp.status, 503);
    assert_eq!(resp.body_text(), UNAVAILABLE_BODY);
    assert_ne!(resp.body_text(), "offline");
  }

  #[test]
  fn test_trailing_slash_matches() {
    let mut routes = OfflineRoutes::new();
    routes.insert_static("/login", Response::text(200, "offline"));

    assert!(routes.contains("/login/"));
    assert_eq!(routes.respond(&request(Method::GET, "/login/")).status, 200);
  }

  #[test]
  fn test_responder_sees_request() {
    let mut routes = OfflineRoutes::new();
    routes.insert("/echo", |req| Response::text(200, req.method.as_str()));

    let resp = routes.respond(&request(Method::PUT, "/echo"));
    assert_eq!(resp.body_text(), "PUT");
  }
}
