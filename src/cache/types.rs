//! Core types for the cache: request identities and response snapshots.

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// An inbound fetch descriptor, as dispatched by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self { method, url }
  }

  /// Shorthand for a GET request.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// The identity this request is stored under.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Identity of a cache entry: method plus URL, with the fragment dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 of the identity, used as a stable fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// An immutable copy of a response: status, headers and the full body.
///
/// Not `Clone`: a response that is both returned and stored is copied with
/// [`ResponseSnapshot::duplicate`].
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseSnapshot {
  status: StatusCode,
  headers: Vec<(String, String)>,
  body: Vec<u8>,
}

impl ResponseSnapshot {
  pub fn new(status: StatusCode, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers,
      body: body.into(),
    }
  }

  /// The response served when the network failed and nothing was cached.
  pub fn unavailable() -> Self {
    Self::new(
      StatusCode::SERVICE_UNAVAILABLE,
      vec![(
        "content-type".to_string(),
        "text/plain; charset=utf-8".to_string(),
      )],
      "Service Unavailable: offline and not cached",
    )
  }

  pub fn status(&self) -> StatusCode {
    self.status
  }

  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  pub fn headers(&self) -> &[(String, String)] {
    &self.headers
  }

  /// First header value matching `name`, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body(&self) -> &[u8] {
    &self.body
  }

  /// Structural copy of the whole snapshot, body included.
  pub fn duplicate(&self) -> Self {
    Self {
      status: self.status,
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }
}

/// A response read back from storage.
#[derive(Debug)]
pub struct CachedResponse {
  pub response: ResponseSnapshot,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_key_ignores_fragment() {
    let a = Request::get(url("https://app.test/index.html#top")).key();
    let b = Request::get(url("https://app.test/index.html")).key();
    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_key_includes_method() {
    let get = Request::get(url("https://app.test/a")).key();
    let head = Request::new(Method::HEAD, url("https://app.test/a")).key();
    assert_ne!(get.cache_hash(), head.cache_hash());
    assert_eq!(get.to_string(), "GET https://app.test/a");
  }

  #[test]
  fn test_key_keeps_query() {
    let a = Request::get(url("https://app.test/a?v=1")).key();
    let b = Request::get(url("https://app.test/a?v=2")).key();
    assert_ne!(a, b);
  }

  #[test]
  fn test_duplicate_is_equal_and_independent() {
    let original = ResponseSnapshot::new(
      StatusCode::OK,
      vec![("Content-Type".to_string(), "text/html".to_string())],
      "<html></html>",
    );
    let copy = original.duplicate();
    assert_eq!(original, copy);
    assert_eq!(copy.body(), b"<html></html>");
    assert_eq!(original.header("content-type"), Some("text/html"));
  }

  #[test]
  fn test_unavailable_response() {
    let response = ResponseSnapshot::unavailable();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.is_success());
    assert!(response.header("Content-Type").unwrap().starts_with("text/plain"));
  }
}
