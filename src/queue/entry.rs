//! Records persisted by the entry store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::snapshot::RequestSnapshot;

/// The opaque payload of a queue entry. The store never looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
  pub request: RequestSnapshot,
  /// When the request was queued, milliseconds since the Unix epoch
  pub timestamp: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
}

impl QueuedRequest {
  /// Wrap a request, stamped with the current time.
  pub fn new(request: RequestSnapshot) -> Self {
    Self {
      request,
      timestamp: Utc::now().timestamp_millis(),
      metadata: None,
    }
  }

  pub fn with_timestamp(mut self, timestamp: i64) -> Self {
    self.timestamp = timestamp;
    self
  }

  pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
    self.metadata = Some(metadata);
    self
  }
}

/// One stored entry.
///
/// `id` is `None` until the store assigns one. Entries are immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
  pub id: Option<i64>,
  pub queue_name: String,
  pub payload: QueuedRequest,
}
