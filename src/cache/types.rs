//! Plain-data request/response types shared by the controller, policy and storage.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set a header, replacing any existing value with the same name.
  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
      Some(existing) => existing.1 = value,
      None => self.0.push((name, value)),
    }
  }

  /// Append a header without replacing earlier values (e.g. `Set-Cookie`).
  pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.0.push((name.into(), value.into()));
  }

  /// Remove every header with this name.
  pub fn remove(&mut self, name: &str) {
    self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn contains(&self, name: &str) -> bool {
    self.get(name).is_some()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Only bodiless GET requests may be looked up in or written to the cache.
  pub fn is_cache_eligible(&self) -> bool {
    self.method == Method::GET && self.body.is_none()
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  pub fn fingerprint(&self) -> Fingerprint {
    let mut url = self.url.clone();
    url.set_fragment(None);
    Fingerprint {
      method: self.method.as_str().to_string(),
      url: url.to_string(),
    }
  }
}

/// Cache lookup key: the (method, URL) pair of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
  pub method: String,
  pub url: String,
}

impl Fingerprint {
  /// SHA256 hash for stable, fixed-length keys
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// How the response was produced by the network stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
  #[default]
  Basic,
  /// Cross-origin redirect that was not followed; its target is not inspectable.
  OpaqueRedirect,
}

impl ResponseKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::OpaqueRedirect => "opaqueredirect",
    }
  }

  pub fn parse(s: &str) -> Self {
    match s {
      "opaqueredirect" => Self::OpaqueRedirect,
      _ => Self::Basic,
    }
  }
}

/// Headers bound to one client's session. Never replayed from the cache.
const SESSION_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// A captured response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Headers::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  /// A `text/plain` response, used for synthesized offline replies.
  pub fn text(status: u16, body: &str) -> Self {
    Self::new(status, body).with_header("Content-Type", "text/plain; charset=utf-8")
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  pub fn with_kind(mut self, kind: ResponseKind) -> Self {
    self.kind = kind;
    self
  }

  pub fn is_ok(&self) -> bool {
    self.status == 200
  }

  /// Media type of the body without parameters, lowercased.
  pub fn media_type(&self) -> Option<String> {
    self.headers.get("content-type").map(|ct| {
      ct.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
    })
  }

  /// Copy to write into a cache store, without session-bound headers.
  pub fn to_cached(&self) -> Self {
    let mut cached = self.clone();
    for name in SESSION_HEADERS {
      cached.headers.remove(name);
    }
    cached
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Terminal state reached while handling a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Served from the cache store; no network call was made
  Cached,
  /// Fetched and passed the cacheability check; a write was issued.
  ///
  /// A failed write is logged where it completes and does not change the outcome,
  /// so the next request for the same fingerprint may miss again.
  Stored,
  /// Fetched with status 200 but rejected by the cacheability check
  Uncached,
  /// Fetched with a non-200 status, returned untouched
  AsIs,
  /// Network unreachable; answered from the offline route table or the 503 fallback
  OfflineFallback,
  /// Not cache-eligible; forwarded to the network
  NetworkPassthrough,
}

impl Outcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Cached => "cached",
      Self::Stored => "stored",
      Self::Uncached => "uncached",
      Self::AsIs => "as-is",
      Self::OfflineFallback => "offline-fallback",
      Self::NetworkPassthrough => "network-passthrough",
    }
  }
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The single response produced for an intercepted request.
#[derive(Debug, Clone)]
pub struct Handled {
  pub response: Response,
  pub outcome: Outcome,
}

impl Handled {
  pub fn new(response: Response, outcome: Outcome) -> Self {
    Self { response, outcome }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_headers_case_insensitive() {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/html");
    headers.insert("content-type", "text/css");

    assert_eq!(headers.get("CONTENT-TYPE"), Some("text/css"));
    assert_eq!(headers.iter().count(), 1);
  }

  #[test]
  fn test_get_without_body_is_eligible() {
    let req = Request::get(url("http://localhost:8000/resource"));
    assert!(req.is_cache_eligible());
  }

  #[test]
  fn test_post_and_get_with_body_not_eligible() {
    let post = Request::new(Method::POST, url("http://localhost:8000/login"));
    assert!(!post.is_cache_eligible());

    let get_with_body = Request::get(url("http://localhost:8000/resource")).with_body("x");
    assert!(!get_with_body.is_cache_eligible());
  }

  #[test]
  fn test_fingerprint_ignores_fragment() {
    let a = Request::get(url("http://localhost:8000/resource#top")).fingerprint();
    let b = Request::get(url("http://localhost:8000/resource")).fingerprint();
    assert_eq!(a, b);
    assert_eq!(a.hash(), b.hash());
  }

  #[test]
  fn test_fingerprint_keeps_query() {
    let a = Request::get(url("http://localhost:8000/resource?page=1")).fingerprint();
    let b = Request::get(url("http://localhost:8000/resource?page=2")).fingerprint();
    assert_ne!(a.hash(), b.hash());
  }

  #[test]
  fn test_cached_copy_drops_session_headers() {
    let mut resp = Response::new(200, "<html></html>")
      .with_header("Content-Type", "text/html")
      .with_header("Set-Cookie2", "legacy=1");
    resp.headers.append("Set-Cookie", "connect.sid=s%3Aabc; Path=/; HttpOnly");
    resp.headers.append("set-cookie", "theme=dark");

    let cached = resp.to_cached();

    assert!(!cached.headers.contains("set-cookie"));
    assert!(!cached.headers.contains("set-cookie2"));
    assert_eq!(cached.headers.get("content-type"), Some("text/html"));
    assert_eq!(cached.body, resp.body);
    // The live response keeps them
    assert!(resp.headers.contains("set-cookie"));
  }

  #[test]
  fn test_media_type_strips_parameters() {
    let resp = Response::new(200, "{}").with_header("Content-Type", "Application/JSON; charset=utf-8");
    assert_eq!(resp.media_type().as_deref(), Some("application/json"));
  }
}
