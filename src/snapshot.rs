//! Serializable snapshots of HTTP requests and responses.
//!
//! Requests are what gets queued for background sync and what keys the
//! response cache. Responses are what the cache stores.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Header carrying the cache-write time (milliseconds since the Unix epoch).
///
/// Entries written by earlier versions use the same name; do not change it.
pub const CACHE_TIMESTAMP_HEADER: &str = "sw-fetched-on";

/// A request captured by value. Header names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Vec<u8>>,
}

impl RequestSnapshot {
  pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      method: method.into().to_uppercase(),
      url: url.into(),
      headers: BTreeMap::new(),
      body: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new("GET", url)
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name.to_lowercase(), value.into());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Only GET responses may be written to the response cache.
  pub fn is_cacheable_method(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// Stable identity of this request in the response cache.
  ///
  /// Method plus normalized URL, hashed for a fixed-length key. Headers and
  /// body do not participate.
  pub fn cache_key(&self) -> String {
    let input = format!("{} {}", self.method.to_uppercase(), normalize_url(&self.url));

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Parse and re-serialize so equivalent spellings share a cache key.
/// Unparseable URLs are used verbatim.
fn normalize_url(url: &str) -> String {
  url::Url::parse(url)
    .map(|u| u.to_string())
    .unwrap_or_else(|_| url.to_string())
}

/// Collect header pairs into a map, lowercasing names.
///
/// A name that appears more than once keeps every value, joined with ", "
/// in arrival order.
pub fn merge_headers<I, N, V>(pairs: I) -> BTreeMap<String, String>
where
  I: IntoIterator<Item = (N, V)>,
  N: AsRef<str>,
  V: AsRef<str>,
{
  let mut headers: BTreeMap<String, String> = BTreeMap::new();
  for (name, value) in pairs {
    headers
      .entry(name.as_ref().to_lowercase())
      .and_modify(|existing| {
        existing.push_str(", ");
        existing.push_str(value.as_ref());
      })
      .or_insert_with(|| value.as_ref().to_string());
  }
  headers
}

/// A response captured by value. Header names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
  pub status: u16,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl ResponseSnapshot {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  /// Build a copy of this response with one header added or replaced.
  /// The original is left untouched.
  pub fn with_header(&self, name: &str, value: impl Into<String>) -> Self {
    let mut headers = self.headers.clone();
    headers.insert(name.to_lowercase(), value.into());
    Self {
      status: self.status,
      headers,
      body: self.body.clone(),
    }
  }

  /// When this response was written to the cache, if it carries the timestamp header.
  pub fn cached_at(&self) -> Option<DateTime<Utc>> {
    let millis: i64 = self.header(CACHE_TIMESTAMP_HEADER)?.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
  }
}
