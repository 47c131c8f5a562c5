//! Outbound HTTP transport.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::redirect::{Attempt, Policy};
use url::Url;

use crate::cache::{CacheError, Headers, Request, Response, ResponseKind};

const MAX_REDIRECTS: usize = 10;

/// Ordinary outbound fetch capability.
///
/// Any failure to obtain a response (connection refused, DNS, host timeout) is
/// reported as [`CacheError::NetworkUnavailable`]. Non-2xx statuses are responses, not errors.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, CacheError>;
}

/// reqwest-backed transport.
///
/// Same-origin redirects are followed. A redirect to another origin is not followed
/// and comes back as an [`ResponseKind::OpaqueRedirect`] response.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Result<Self> {
    let client = client_builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

fn client_builder() -> reqwest::ClientBuilder {
  reqwest::Client::builder()
    .redirect(Policy::custom(same_origin_redirects))
    .user_agent(concat!("shakeguard-offline/", env!("CARGO_PKG_VERSION")))
}

fn same_origin_redirects(attempt: Attempt<'_>) -> reqwest::redirect::Action {
  if attempt.previous().len() >= MAX_REDIRECTS {
    return attempt.error("too many redirects");
  }

  let crosses_origin = attempt
    .previous()
    .first()
    .is_some_and(|first| first.origin() != attempt.url().origin());

  if crosses_origin {
    attempt.stop()
  } else {
    attempt.follow()
  }
}

/// True when `location` (resolved against `base`) points at a different origin.
fn is_cross_origin(base: &Url, location: Option<&str>) -> bool {
  location
    .and_then(|loc| base.join(loc).ok())
    .is_some_and(|target| target.origin() != base.origin())
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in request.headers.iter() {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| CacheError::NetworkUnavailable(format!("{} {}: {}", request.method, request.url, e)))?;

    let status = resp.status();
    let mut headers = Headers::new();
    for (name, value) in resp.headers() {
      // Non-UTF-8 header values cannot be replayed from the cache
      if let Ok(value) = value.to_str() {
        headers.append(name.as_str(), value);
      }
    }

    let kind = if status.is_redirection() && is_cross_origin(resp.url(), headers.get("location")) {
      ResponseKind::OpaqueRedirect
    } else {
      ResponseKind::Basic
    };

    let body = resp
      .bytes()
      .await
      .map_err(|e| CacheError::NetworkUnavailable(format!("Failed to read body of {}: {}", request.url, e)))?
      .to_vec();

    Ok(Response {
      status: status.as_u16(),
      headers,
      body,
      kind,
    })
  }
}
