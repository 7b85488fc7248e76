//! Network transport used by the strategy.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::NetworkError;
use crate::snapshot::{merge_headers, RequestSnapshot, ResponseSnapshot};

/// Issues a request over the network.
///
/// Any HTTP status is a successful fetch. Only transport failures
/// (DNS, connection, TLS, body read) are errors.
#[async_trait]
pub trait Fetch: Send + Sync {
  async fn fetch(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, NetworkError>;
}

/// HTTP client wrapper
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new() -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("netsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| NetworkError::Transport(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self { client })
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }

  fn build(&self, request: &RequestSnapshot) -> Result<reqwest::RequestBuilder, NetworkError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| NetworkError::Transport(format!("Invalid method {}: {}", request.method, e)))?;

    let mut builder = self.client.request(method, request.url.as_str());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    Ok(builder)
  }
}

#[async_trait]
impl Fetch for ReqwestFetcher {
  async fn fetch(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, NetworkError> {
    let response = self
      .build(request)?
      .send()
      .await
      .map_err(|e| NetworkError::Transport(format!("Failed to fetch {}: {}", request.url, e)))?;

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());

    let body = response
      .bytes()
      .await
      .map_err(|e| NetworkError::Transport(format!("Failed to read body of {}: {}", request.url, e)))?;

    Ok(ResponseSnapshot {
      status,
      headers,
      body: body.to_vec(),
    })
  }
}

/// Repeated headers are merged rather than overwritten. Non-UTF-8 values are dropped.
fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
  merge_headers(
    headers
      .iter()
      .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
  )
}
