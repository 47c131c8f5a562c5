//! Cacheability policy for successful responses.

use serde::Deserialize;
use std::collections::BTreeSet;

use super::types::{Request, Response, ResponseKind};

/// Denylists consulted before a response is written to the cache store.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CachePolicy {
  /// Pages rendered per session (profile, dashboard); caching them leaks user data
  #[serde(deserialize_with = "deserialize_path_set")]
  pub templated_pages: BTreeSet<String>,
  /// JSON/data routes that must always reflect live state
  #[serde(deserialize_with = "deserialize_path_set")]
  pub api_routes: BTreeSet<String>,
  /// Content types treated as API payloads rather than displayable assets
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub api_content_types: BTreeSet<String>,
}

impl Default for CachePolicy {
  fn default() -> Self {
    let paths = |items: &[&str]| -> BTreeSet<String> {
      items.iter().map(|p| normalize_path(p)).collect()
    };
    Self {
      templated_pages: paths(&["/profile", "/dashboard", "/directory", "/admin", "/kits"]),
      api_routes: paths(&[
        "/kit-data",
        "/kit-items",
        "/profile-details",
        "/avatar",
        "/profiles",
        "/people",
        "/logout",
      ]),
      api_content_types: ["application/json", "application/ld+json", "text/json"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
  }
}

fn deserialize_path_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.iter().map(|s| normalize_path(s)).collect())
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.trim().to_lowercase()).collect())
}

/// Strip a trailing slash so `/profile/` and `/profile` compare equal. Root stays `/`.
pub fn normalize_path(path: &str) -> String {
  let trimmed = path.trim();
  let trimmed = trimmed.trim_end_matches('/');
  if trimmed.is_empty() {
    "/".to_string()
  } else if trimmed.starts_with('/') {
    trimmed.to_string()
  } else {
    format!("/{}", trimmed)
  }
}

/// Decide whether a successful response may be stored for this request.
///
/// Pure and total: looks only at the request and response data.
pub fn is_cacheable(policy: &CachePolicy, request: &Request, response: &Response) -> bool {
  // Caller opted out
  if request.headers.contains("cache-control") {
    return false;
  }

  let path = normalize_path(request.path());
  if policy.templated_pages.contains(&path) || policy.api_routes.contains(&path) {
    return false;
  }

  if response.kind == ResponseKind::OpaqueRedirect {
    return false;
  }

  match response.media_type() {
    Some(media_type) => {
      !(policy.api_content_types.contains(&media_type) || media_type.ends_with("+json"))
    }
    None => true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn get(path: &str) -> Request {
    Request::get(Url::parse("http://localhost:8000").unwrap().join(path).unwrap())
  }

  fn html() -> Response {
    Response::new(200, "<html></html>").with_header("Content-Type", "text/html; charset=utf-8")
  }

  #[test]
  fn test_static_page_is_cacheable() {
    let policy = CachePolicy::default();
    assert!(is_cacheable(&policy, &get("/resource_page1"), &html()));
  }

  #[test]
  fn test_missing_content_type_is_cacheable() {
    let policy = CachePolicy::default();
    let resp = Response::new(200, "body");
    assert!(is_cacheable(&policy, &get("/fonts/inter.woff2"), &resp));
  }

  #[test]
  fn test_cache_control_header_opts_out() {
    let policy = CachePolicy::default();
    let req = get("/resource").with_header("Cache-Control", "no-cache");
    assert!(!is_cacheable(&policy, &req, &html()));
  }

  #[test]
  fn test_templated_pages_rejected() {
    let policy = CachePolicy::default();
    assert!(!is_cacheable(&policy, &get("/profile"), &html()));
    assert!(!is_cacheable(&policy, &get("/profile/"), &html()));
    assert!(!is_cacheable(&policy, &get("/dashboard"), &html()));
  }

  #[test]
  fn test_api_routes_rejected_regardless_of_content_type() {
    let policy = CachePolicy::default();
    assert!(!is_cacheable(&policy, &get("/kit-data"), &html()));
    assert!(!is_cacheable(&policy, &get("/avatar"), &Response::new(200, vec![0u8, 1, 2])));
  }

  #[test]
  fn test_user_listing_routes_rejected() {
    let policy = CachePolicy::default();
    // Per-user listings fetched by the dashboard and directory scripts
    let list = Response::new(200, "[]").with_header("Content-Type", "text/plain");
    assert!(!is_cacheable(&policy, &get("/profiles"), &list));
    assert!(!is_cacheable(&policy, &get("/people?limit=20"), &list));
  }

  #[test]
  fn test_query_string_does_not_bypass_denylist() {
    let policy = CachePolicy::default();
    assert!(!is_cacheable(&policy, &get("/profile?tab=kits"), &html()));
  }

  #[test]
  fn test_opaque_redirect_rejected() {
    let policy = CachePolicy::default();
    let resp = html().with_kind(ResponseKind::OpaqueRedirect);
    assert!(!is_cacheable(&policy, &get("/resource"), &resp));
  }

  #[test]
  fn test_api_content_types_rejected() {
    let policy = CachePolicy::default();
    let json = Response::new(200, "{}").with_header("Content-Type", "application/json");
    let problem = Response::new(200, "{}").with_header("Content-Type", "application/problem+json");
    assert!(!is_cacheable(&policy, &get("/resource"), &json));
    assert!(!is_cacheable(&policy, &get("/resource"), &problem));
  }

  #[test]
  fn test_normalize_path() {
    assert_eq!(normalize_path("/"), "/");
    assert_eq!(normalize_path(""), "/");
    assert_eq!(normalize_path("profile/"), "/profile");
    assert_eq!(normalize_path("/js/client.js"), "/js/client.js");
  }

  #[test]
  fn test_policy_from_yaml() {
    let policy: CachePolicy = serde_yaml::from_str(
      "templated_pages: [\"/me/\"]\napi_content_types: [\"Application/XML\"]\n",
    )
    .unwrap();

    assert!(policy.templated_pages.contains("/me"));
    assert!(policy.api_content_types.contains("application/xml"));
    // Unset lists keep their defaults
    assert!(policy.api_routes.contains("/kit-data"));
  }
}
