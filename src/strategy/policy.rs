use std::collections::BTreeMap;

use crate::snapshot::ResponseSnapshot;

/// Allow-list deciding whether a response may be written to the cache.
///
/// An empty status list accepts any status; an empty header map accepts any
/// headers. Otherwise the status must be listed and every required header
/// must be present with exactly the expected value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheableResponse {
  pub statuses: Vec<u16>,
  pub headers: BTreeMap<String, String>,
}

impl CacheableResponse {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
    self.statuses = statuses.into_iter().collect();
    self
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name.to_lowercase(), value.into());
    self
  }

  pub fn is_cacheable(&self, response: &ResponseSnapshot) -> bool {
    let status_ok = self.statuses.is_empty() || self.statuses.contains(&response.status);

    let headers_ok = self
      .headers
      .iter()
      .all(|(name, expected)| response.header(name) == Some(expected.as_str()));

    status_ok && headers_ok
  }
}
