//! Network-first strategy: live response when possible, cached response otherwise.

use chrono::Utc;
use futures::future::Either;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::fetch::Fetch;
use super::policy::CacheableResponse;
use super::race::race;
use crate::cache::{CacheHandle, CacheResult, CacheStorage};
use crate::error::{NetworkError, StrategyError, TimeoutError};
use crate::snapshot::{RequestSnapshot, ResponseSnapshot, CACHE_TIMESTAMP_HEADER};

pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

/// How the cache write after a successful fetch relates to returning the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheWriteMode {
  /// Spawn the write on the blocking pool and return immediately. Write
  /// failures are logged. A write still queued when the runtime shuts down
  /// is lost, so short-lived processes should use `Await`.
  #[default]
  Background,
  /// Finish the write before returning. Write failures are logged; the
  /// network response is returned either way.
  Await,
}

#[derive(Debug, Clone)]
pub struct NetworkFirstOptions {
  pub cache_name: String,
  /// `None` waits on the network indefinitely
  pub network_timeout: Option<Duration>,
  /// `None` caches every response
  pub cacheable_response: Option<CacheableResponse>,
  pub cache_write: CacheWriteMode,
}

impl Default for NetworkFirstOptions {
  fn default() -> Self {
    Self {
      cache_name: "network-first".to_string(),
      network_timeout: Some(DEFAULT_NETWORK_TIMEOUT),
      cacheable_response: None,
      cache_write: CacheWriteMode::default(),
    }
  }
}

/// Network-first fetch strategy.
///
/// 1. Race the network fetch against the timeout (if any)
/// 2. Network wins: validate, store a timestamped copy, return the original
/// 3. Network fails or timer wins: serve the cached response for the request
/// 4. Nothing cached: fail with [`StrategyError::NetworkFallback`]
///
/// The fetch runs as its own task. When the timer wins the task keeps
/// running but its result is discarded, so only the winner's continuation
/// ever touches the cache.
pub struct NetworkFirst<F: Fetch, S: CacheStorage> {
  fetcher: Arc<F>,
  cache: CacheHandle<S>,
  network_timeout: Option<Duration>,
  cacheable_response: Option<CacheableResponse>,
  cache_write: CacheWriteMode,
}

impl<F, S> NetworkFirst<F, S>
where
  F: Fetch + 'static,
  S: CacheStorage + 'static,
{
  pub fn new(fetcher: F, storage: Arc<S>, options: NetworkFirstOptions) -> Self {
    Self {
      fetcher: Arc::new(fetcher),
      cache: CacheHandle::open(storage, options.cache_name),
      network_timeout: options.network_timeout,
      cacheable_response: options.cacheable_response,
      cache_write: options.cache_write,
    }
  }

  pub fn cache(&self) -> &CacheHandle<S> {
    &self.cache
  }

  /// Produce a response for the request, from the network or the cache.
  pub async fn handle(
    &self,
    request: &RequestSnapshot,
  ) -> Result<CacheResult<ResponseSnapshot>, StrategyError> {
    match self.fetch_from_network(request).await {
      Ok(response) => {
        debug!(url = %request.url, status = response.status, "network response");
        self.cache_response(request, &response);
        Ok(CacheResult::from_network(response))
      }
      Err(error) => {
        info!(url = %request.url, %error, "network unavailable, trying cache");
        self.fallback_to_cache(request, error)
      }
    }
  }

  async fn fetch_from_network(
    &self,
    request: &RequestSnapshot,
  ) -> Result<ResponseSnapshot, NetworkError> {
    let fetcher = Arc::clone(&self.fetcher);
    let owned = request.clone();
    let task = tokio::spawn(async move { fetcher.fetch(&owned).await });

    let network = async move {
      match task.await {
        Ok(result) => result,
        Err(e) => Err(NetworkError::Transport(format!("Fetch task failed: {}", e))),
      }
    };

    let Some(timeout) = self.network_timeout else {
      return network.await;
    };

    match race(network, tokio::time::sleep(timeout)).await {
      Either::Left(result) => result,
      Either::Right(()) => Err(TimeoutError(timeout).into()),
    }
  }

  fn is_cacheable(&self, response: &ResponseSnapshot) -> bool {
    self
      .cacheable_response
      .as_ref()
      .map_or(true, |policy| policy.is_cacheable(response))
  }

  /// Store a timestamped copy of a valid response. Never fails the request.
  fn cache_response(&self, request: &RequestSnapshot, response: &ResponseSnapshot) {
    if !request.is_cacheable_method() {
      debug!(method = %request.method, url = %request.url, "not caching non-GET request");
      return;
    }

    if !self.is_cacheable(response) {
      debug!(url = %request.url, status = response.status, "response not cacheable");
      return;
    }

    let fetched_on = Utc::now().timestamp_millis().to_string();
    let annotated = response.with_header(CACHE_TIMESTAMP_HEADER, fetched_on);

    match self.cache_write {
      CacheWriteMode::Await => write_to_cache(&self.cache, request, &annotated),
      CacheWriteMode::Background => {
        let cache = self.cache.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || write_to_cache(&cache, &request, &annotated));
      }
    }
  }

  fn fallback_to_cache(
    &self,
    request: &RequestSnapshot,
    error: NetworkError,
  ) -> Result<CacheResult<ResponseSnapshot>, StrategyError> {
    match self.cache.match_request(request)? {
      Some(cached) => {
        debug!(cache = %self.cache.name(), url = %request.url, "serving cached response");
        let cached_at = cached.cached_at();
        Ok(CacheResult::from_cache(cached, cached_at))
      }
      None => Err(StrategyError::NetworkFallback {
        url: request.url.clone(),
        message: format!("{}; no cached response in '{}'", error, self.cache.name()),
      }),
    }
  }
}

fn write_to_cache<S: CacheStorage>(
  cache: &CacheHandle<S>,
  request: &RequestSnapshot,
  response: &ResponseSnapshot,
) {
  if let Err(e) = cache.put(request, response) {
    warn!(cache = %cache.name(), url = %request.url, error = %e, "cache write failed");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteCacheStorage};
  use crate::db::Database;
  use crate::error::StorageError;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Fetcher that answers after a fixed delay.
  struct MockFetcher {
    outcome: Result<ResponseSnapshot, String>,
    delay: Duration,
    completed: Arc<AtomicUsize>,
  }

  impl MockFetcher {
    fn responding(response: ResponseSnapshot) -> Self {
      Self {
        outcome: Ok(response),
        delay: Duration::ZERO,
        completed: Arc::new(AtomicUsize::new(0)),
      }
    }

    fn failing() -> Self {
      Self {
        outcome: Err("connection refused".to_string()),
        delay: Duration::ZERO,
        completed: Arc::new(AtomicUsize::new(0)),
      }
    }

    fn after(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
    }
  }

  #[async_trait]
  impl Fetch for MockFetcher {
    async fn fetch(&self, _request: &RequestSnapshot) -> Result<ResponseSnapshot, NetworkError> {
      tokio::time::sleep(self.delay).await;
      self.completed.fetch_add(1, Ordering::SeqCst);
      self.outcome.clone().map_err(NetworkError::Transport)
    }
  }

  /// SQLite cache that counts writes and can be told to fail them.
  struct CountingCache {
    inner: SqliteCacheStorage,
    puts: AtomicUsize,
    fail_puts: bool,
  }

  impl CountingCache {
    fn new() -> Arc<Self> {
      Self::with_failing_puts(false)
    }

    fn with_failing_puts(fail_puts: bool) -> Arc<Self> {
      Arc::new(Self {
        inner: SqliteCacheStorage::new(Arc::new(Database::open_in_memory().unwrap())),
        puts: AtomicUsize::new(0),
        fail_puts,
      })
    }

    fn puts(&self) -> usize {
      self.puts.load(Ordering::SeqCst)
    }
  }

  impl CacheStorage for CountingCache {
    fn match_request(
      &self,
      cache_name: &str,
      request: &RequestSnapshot,
    ) -> Result<Option<ResponseSnapshot>, StorageError> {
      self.inner.match_request(cache_name, request)
    }

    fn put(
      &self,
      cache_name: &str,
      request: &RequestSnapshot,
      response: &ResponseSnapshot,
    ) -> Result<(), StorageError> {
      self.puts.fetch_add(1, Ordering::SeqCst);
      if self.fail_puts {
        return Err(StorageError::LockPoisoned("disk full".into()));
      }
      self.inner.put(cache_name, request, response)
    }

    fn delete(&self, cache_name: &str, request: &RequestSnapshot) -> Result<bool, StorageError> {
      self.inner.delete(cache_name, request)
    }

    fn keys(&self, cache_name: &str) -> Result<Vec<RequestSnapshot>, StorageError> {
      self.inner.keys(cache_name)
    }
  }

  fn options() -> NetworkFirstOptions {
    NetworkFirstOptions {
      cache_name: "test".to_string(),
      cache_write: CacheWriteMode::Await,
      ..Default::default()
    }
  }

  fn request() -> RequestSnapshot {
    RequestSnapshot::get("https://example.com/page")
  }

  #[tokio::test]
  async fn test_network_response_returned_and_cached_with_timestamp() {
    let cache = CountingCache::new();
    let live = ResponseSnapshot::new(200, "live").with_header("content-type", "text/plain");
    let strategy = NetworkFirst::new(MockFetcher::responding(live.clone()), cache.clone(), options());
    let started = Utc::now().timestamp_millis();

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, live);
    assert!(result.data.header(CACHE_TIMESTAMP_HEADER).is_none());
    assert_eq!(cache.puts(), 1);

    let stored = strategy.cache().match_request(&request()).unwrap().unwrap();
    let stamp: i64 = stored.header(CACHE_TIMESTAMP_HEADER).unwrap().parse().unwrap();
    assert!(stamp >= started);
    assert_eq!(stored.body, live.body);
    assert_eq!(stored.header("content-type"), Some("text/plain"));
  }

  #[tokio::test]
  async fn test_rejected_status_not_cached() {
    let cache = CountingCache::new();
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(500, "boom")),
      cache.clone(),
      NetworkFirstOptions {
        cacheable_response: Some(CacheableResponse::new().with_statuses([200])),
        ..options()
      },
    );

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.data.status, 500);
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(cache.puts(), 0);
  }

  #[tokio::test]
  async fn test_missing_required_header_not_cached() {
    let cache = CountingCache::new();
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "ok")),
      cache.clone(),
      NetworkFirstOptions {
        cacheable_response: Some(CacheableResponse::new().with_header("x-is-cacheable", "true")),
        ..options()
      },
    );

    strategy.handle(&request()).await.unwrap();

    assert_eq!(cache.puts(), 0);
  }

  #[tokio::test]
  async fn test_non_get_not_cached() {
    let cache = CountingCache::new();
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(201, "created")),
      cache.clone(),
      options(),
    );

    let post = RequestSnapshot::new("POST", "https://example.com/items");
    let result = strategy.handle(&post).await.unwrap();

    assert_eq!(result.data.status, 201);
    assert_eq!(cache.puts(), 0);
  }

  #[tokio::test]
  async fn test_network_failure_serves_cache_unchanged() {
    let cache = CountingCache::new();
    let strategy = NetworkFirst::new(MockFetcher::failing(), cache.clone(), options());
    let cached = ResponseSnapshot::new(200, "cached").with_header(CACHE_TIMESTAMP_HEADER, "1700000000000");
    strategy.cache().put(&request(), &cached).unwrap();

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data, cached);
    assert_eq!(result.cached_at.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
    assert_eq!(cache.puts(), 1);
  }

  #[tokio::test]
  async fn test_network_failure_and_cache_miss() {
    let strategy = NetworkFirst::new(MockFetcher::failing(), CountingCache::new(), options());

    let error = strategy.handle(&request()).await.unwrap_err();

    match error {
      StrategyError::NetworkFallback { url, message } => {
        assert_eq!(url, "https://example.com/page");
        assert!(message.contains("connection refused"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_serves_cache_and_late_response_is_not_cached() {
    let cache = CountingCache::new();
    let fetcher = MockFetcher::responding(ResponseSnapshot::new(200, "late"))
      .after(Duration::from_millis(50));
    let completed = Arc::clone(&fetcher.completed);
    let strategy = NetworkFirst::new(
      fetcher,
      cache.clone(),
      NetworkFirstOptions {
        network_timeout: Some(Duration::from_millis(10)),
        ..options()
      },
    );
    let cached = ResponseSnapshot::new(200, "cached");
    strategy.cache().put(&request(), &cached).unwrap();

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data, cached);
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    // Let the abandoned fetch finish
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(cache.puts(), 1);
    let still = strategy.cache().match_request(&request()).unwrap().unwrap();
    assert_eq!(still.body, b"cached");
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_and_cache_miss() {
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "late")).after(Duration::from_secs(30)),
      CountingCache::new(),
      options(),
    );

    let error = strategy.handle(&request()).await.unwrap_err();

    match error {
      StrategyError::NetworkFallback { message, .. } => assert!(message.contains("timed out")),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_beats_timer_writes_once() {
    let cache = CountingCache::new();
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "fast")).after(Duration::from_millis(5)),
      cache.clone(),
      NetworkFirstOptions {
        network_timeout: Some(Duration::from_millis(20)),
        ..options()
      },
    );

    let result = strategy.handle(&request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(cache.puts(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_infinite_timeout_waits_for_network() {
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "slow")).after(Duration::from_secs(120)),
      CountingCache::new(),
      NetworkFirstOptions {
        network_timeout: None,
        ..options()
      },
    );

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.body, b"slow");
  }

  #[tokio::test]
  async fn test_awaited_cache_write_failure_still_returns_response() {
    let cache = CountingCache::with_failing_puts(true);
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "ok")),
      cache.clone(),
      options(),
    );

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.status, 200);
    assert_eq!(result.data.body, b"ok");
    // The write was attempted before returning
    assert_eq!(cache.puts(), 1);
  }

  #[tokio::test]
  async fn test_background_cache_write_failure_still_returns_response() {
    let cache = CountingCache::with_failing_puts(true);
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "ok")),
      cache.clone(),
      NetworkFirstOptions {
        cache_write: CacheWriteMode::Background,
        ..options()
      },
    );

    let result = strategy.handle(&request()).await.unwrap();

    assert_eq!(result.data.body, b"ok");
  }

  #[tokio::test]
  async fn test_background_cache_write_lands() {
    let cache = CountingCache::new();
    let strategy = NetworkFirst::new(
      MockFetcher::responding(ResponseSnapshot::new(200, "ok")),
      cache.clone(),
      NetworkFirstOptions {
        cache_write: CacheWriteMode::Background,
        ..options()
      },
    );

    strategy.handle(&request()).await.unwrap();

    let mut stored = None;
    for _ in 0..100 {
      stored = strategy.cache().match_request(&request()).unwrap();
      if stored.is_some() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stored = stored.expect("background write never landed");
    assert!(stored.header(CACHE_TIMESTAMP_HEADER).is_some());
    assert_eq!(cache.puts(), 1);
  }
}
