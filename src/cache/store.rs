//! Process-scoped query cache.
//!
//! Owns the cache entry table and the tag index. Entries are created on the
//! first subscription, shared by every later subscription with the same key,
//! refetched when a tag they provide is invalidated, and evicted once the
//! last subscriber is gone and the retention period has passed.

use std::any::Any;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::query::{QuerySnapshot, QueryState};

use super::tags::{Tag, TagIndex};
use super::traits::{CacheKey, QueryKey, QueryOptions, RefetchPolicy};

/// A boxed future that resolves to a query result
pub type BoxFetch<T> = BoxFuture<'static, Result<T, TransportError>>;

/// A factory that creates futures for fetching one query's data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFetch<T> + Send + Sync>;

/// How long an unused entry is kept by default
pub const DEFAULT_KEEP_UNUSED_FOR: Duration = Duration::from_secs(60);

/// Handle to the shared cache. Cloning is cheap; all clones see one table.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Mutex<CacheInner>>,
  keep_unused_for: Duration,
}

#[derive(Default)]
struct CacheInner {
  entries: HashMap<CacheKey, Box<dyn AnyEntry>>,
  tags: TagIndex,
  last_request: u64,
}

impl CacheInner {
  fn next_request(last_request: &mut u64) -> u64 {
    *last_request += 1;
    *last_request
  }
}

/// Type-erased view of a cache entry, for operations that don't need `T`.
trait AnyEntry: Send {
  fn as_any_mut(&mut self) -> &mut dyn Any;
  fn tags(&self) -> &'static [Tag];
  fn description(&self) -> &str;
  fn subscribers(&self) -> usize;
  fn eviction_epoch(&self) -> u64;
  fn is_in_flight(&self) -> bool;
  /// Evict once the in-flight request settles, unless resubscribed.
  fn defer_eviction(&mut self);
  /// Drop one subscriber; returns the eviction epoch if none remain.
  fn release(&mut self) -> Option<u64>;
  /// Invalidation: refetch now, after the current request, or lazily.
  fn invalidate(&mut self, cache: &QueryCache, key: &CacheKey, request: u64) -> bool;
  fn start(&mut self, cache: &QueryCache, key: &CacheKey, request: u64);
}

struct Entry<T> {
  description: String,
  tags: &'static [Tag],
  fetcher: FetcherFn<T>,
  tx: watch::Sender<QuerySnapshot<T>>,
  subscribers: usize,
  /// Invalidated while nobody was subscribed; refetch on next subscription
  stale: bool,
  /// Id of the request whose result this entry will accept
  in_flight: Option<u64>,
  /// Invalidated while a request was in flight
  refetch_after_flight: bool,
  /// Bumped on every subscribe/release so a scheduled eviction can tell
  /// whether it is still current
  eviction_epoch: u64,
  /// Retention ran out while a request was in flight
  evict_after_flight: bool,
}

impl<T: Clone + Send + Sync + 'static> Entry<T> {
  fn new(description: String, tags: &'static [Tag], fetcher: FetcherFn<T>) -> Self {
    let (tx, _) = watch::channel(QuerySnapshot::idle());
    Self {
      description,
      tags,
      fetcher,
      tx,
      subscribers: 0,
      stale: false,
      in_flight: None,
      refetch_after_flight: false,
      eviction_epoch: 0,
      evict_after_flight: false,
    }
  }

  fn needs_fetch(&self, policy: RefetchPolicy) -> bool {
    if self.in_flight.is_some() {
      return false;
    }
    self.stale || policy == RefetchPolicy::OnSubscribe || !self.tx.borrow().state.is_success()
  }

  /// Store a request's outcome. `refetching` keeps the entry marked as
  /// fetching when another request follows immediately.
  fn settle(&mut self, result: Result<T, TransportError>, refetching: bool) {
    self.in_flight = None;
    match result {
      Ok(data) => {
        self.tx.send_replace(QuerySnapshot {
          state: QueryState::Success(data),
          is_fetching: refetching,
          fetched_at: Some(Utc::now()),
        });
      }
      Err(e) => {
        warn!(query = %self.description, error = %e, "query failed");
        self.tx.send_modify(|snap| {
          snap.state = QueryState::Error(e);
          snap.is_fetching = refetching;
        });
      }
    }
  }
}

impl<T: Clone + Send + Sync + 'static> AnyEntry for Entry<T> {
  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }

  fn tags(&self) -> &'static [Tag] {
    self.tags
  }

  fn description(&self) -> &str {
    &self.description
  }

  fn subscribers(&self) -> usize {
    self.subscribers
  }

  fn eviction_epoch(&self) -> u64 {
    self.eviction_epoch
  }

  fn is_in_flight(&self) -> bool {
    self.in_flight.is_some()
  }

  fn defer_eviction(&mut self) {
    self.evict_after_flight = true;
  }

  fn release(&mut self) -> Option<u64> {
    self.subscribers = self.subscribers.saturating_sub(1);
    self.eviction_epoch += 1;
    (self.subscribers == 0).then_some(self.eviction_epoch)
  }

  fn invalidate(&mut self, cache: &QueryCache, key: &CacheKey, request: u64) -> bool {
    if self.in_flight.is_some() {
      self.refetch_after_flight = true;
      false
    } else if self.subscribers > 0 {
      self.start(cache, key, request);
      true
    } else {
      self.stale = true;
      false
    }
  }

  fn start(&mut self, cache: &QueryCache, key: &CacheKey, request: u64) {
    self.in_flight = Some(request);
    self.stale = false;
    self.refetch_after_flight = false;
    self.tx.send_modify(|snap| {
      snap.is_fetching = true;
      // Keep showing previous data during a refetch
      if !snap.state.is_success() {
        snap.state = QueryState::Loading;
      }
    });

    debug!(query = %self.description, request, "fetch started");

    let future = (self.fetcher)();
    let cache = cache.clone();
    let key = key.clone();
    tokio::spawn(async move {
      let result = future.await;
      cache.settle::<T>(&key, request, result);
    });
  }
}

fn downcast<T: 'static>(entry: &mut Box<dyn AnyEntry>) -> Option<&mut Entry<T>> {
  entry.as_any_mut().downcast_mut::<Entry<T>>()
}

impl QueryCache {
  /// Create a cache that keeps unused entries for `keep_unused_for`.
  pub fn new(keep_unused_for: Duration) -> Self {
    Self {
      inner: Arc::new(Mutex::new(CacheInner::default())),
      keep_unused_for,
    }
  }

  pub fn keep_unused_for(&self) -> Duration {
    self.keep_unused_for
  }

  fn lock(&self) -> MutexGuard<'_, CacheInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Subscribe to a query.
  ///
  /// Reuses the entry for `key` if one exists; otherwise creates it. A fetch
  /// is started unless a request is already in flight or the entry holds
  /// fresh data (for `CacheFirst` queries). Must be called from within a
  /// tokio runtime.
  pub fn subscribe<K, T, F>(&self, key: &K, options: QueryOptions, fetcher: F) -> Subscription<T>
  where
    K: QueryKey,
    T: Clone + Send + Sync + 'static,
    F: Fn() -> BoxFetch<T> + Send + Sync + 'static,
  {
    let cache_key = key.cache_key();
    let description = key.description();
    let fetcher: FetcherFn<T> = Arc::new(fetcher);

    let mut guard = self.lock();
    let CacheInner {
      entries,
      tags,
      last_request,
    } = &mut *guard;

    let slot = match entries.entry(cache_key.clone()) {
      MapEntry::Occupied(occupied) => occupied.into_mut(),
      MapEntry::Vacant(vacant) => {
        debug!(query = %description, "cache entry created");
        tags.register(&cache_key, options.tags);
        vacant.insert(Box::new(Entry::new(description.clone(), options.tags, fetcher)))
      }
    };

    // Keys hash the endpoint name, so one key never serves two types
    let Some(entry) = downcast::<T>(slot) else {
      panic!("cache entry for {description} subscribed with a different type");
    };

    entry.subscribers += 1;
    entry.eviction_epoch += 1;
    entry.evict_after_flight = false;

    if entry.needs_fetch(options.policy) {
      let request = CacheInner::next_request(last_request);
      entry.start(self, &cache_key, request);
    } else {
      debug!(query = %description, "cache hit");
    }

    let rx = entry.tx.subscribe();
    drop(guard);

    Subscription {
      key: cache_key,
      rx,
      cache: self.clone(),
    }
  }

  /// Mark every entry tagged with any of `tags` stale.
  ///
  /// Entries with subscribers are refetched now; entries with a request in
  /// flight are refetched after it settles; the rest refetch on their next
  /// subscription. Returns the number of entries affected.
  pub fn invalidate(&self, tags: &[Tag]) -> usize {
    let mut guard = self.lock();
    let CacheInner {
      entries,
      tags: index,
      last_request,
    } = &mut *guard;

    let keys = index.keys_for(tags);
    let mut refetched = 0;
    for key in &keys {
      if let Some(entry) = entries.get_mut(key) {
        let request = CacheInner::next_request(last_request);
        if entry.invalidate(self, key, request) {
          refetched += 1;
        }
      }
    }

    debug!(
      tags = ?tags,
      entries = keys.len(),
      refetched,
      "tags invalidated"
    );
    keys.len()
  }

  /// Force a new request for `key`, superseding one already in flight.
  pub fn refetch(&self, key: &CacheKey) {
    let mut guard = self.lock();
    let CacheInner {
      entries,
      last_request,
      ..
    } = &mut *guard;

    if let Some(entry) = entries.get_mut(key) {
      let request = CacheInner::next_request(last_request);
      entry.start(self, key, request);
    }
  }

  pub fn contains(&self, key: &CacheKey) -> bool {
    self.lock().entries.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of live entries carrying `tag`.
  pub fn tagged(&self, tag: Tag) -> usize {
    self.lock().tags.count(tag)
  }

  fn settle<T: Clone + Send + Sync + 'static>(
    &self,
    key: &CacheKey,
    request: u64,
    result: Result<T, TransportError>,
  ) {
    let mut guard = self.lock();
    let CacheInner {
      entries,
      tags,
      last_request,
    } = &mut *guard;

    let Some(entry) = entries.get_mut(key).and_then(downcast::<T>) else {
      debug!(%key, request, "result for evicted entry dropped");
      return;
    };
    if entry.in_flight != Some(request) {
      debug!(query = %entry.description, request, "superseded result dropped");
      return;
    }

    debug!(query = %entry.description, request, ok = result.is_ok(), "fetch finished");
    let invalidated = std::mem::take(&mut entry.refetch_after_flight);
    let restart = invalidated && entry.subscribers > 0;
    entry.settle(result, restart);

    if restart {
      let request = CacheInner::next_request(last_request);
      entry.start(self, key, request);
    } else if invalidated {
      entry.stale = true;
    }

    if std::mem::take(&mut entry.evict_after_flight) && entry.subscribers == 0 {
      let entry_tags = entry.tags;
      entries.remove(key);
      tags.remove(key, entry_tags);
      debug!(%key, "cache entry evicted after its request settled");
    }
  }

  fn unsubscribe(&self, key: &CacheKey) {
    let epoch = {
      let mut guard = self.lock();
      match guard.entries.get_mut(key) {
        Some(entry) => entry.release(),
        None => None,
      }
    };

    if let Some(epoch) = epoch {
      self.schedule_eviction(key.clone(), epoch);
    }
  }

  fn schedule_eviction(&self, key: CacheKey, epoch: u64) {
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let cache = self.clone();
        let delay = self.keep_unused_for;
        handle.spawn(async move {
          tokio::time::sleep(delay).await;
          cache.evict_if_unused(&key, epoch);
        });
      }
      // No runtime left to wait on; nothing can resubscribe either
      Err(_) => self.evict_if_unused(&key, epoch),
    }
  }

  fn evict_if_unused(&self, key: &CacheKey, epoch: u64) {
    let mut guard = self.lock();
    let CacheInner { entries, tags, .. } = &mut *guard;

    let Some(entry) = entries.get_mut(key) else {
      return;
    };
    if entry.subscribers() > 0 || entry.eviction_epoch() != epoch {
      return;
    }

    // Let the pending request populate the entry first
    if entry.is_in_flight() {
      debug!(query = %entry.description(), "eviction deferred until request settles");
      entry.defer_eviction();
      return;
    }

    if let Some(entry) = entries.remove(key) {
      tags.remove(key, entry.tags());
      debug!(query = %entry.description(), "cache entry evicted");
    }
  }
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new(DEFAULT_KEEP_UNUSED_FOR)
  }
}

impl std::fmt::Debug for QueryCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryCache")
      .field("entries", &self.len())
      .field("keep_unused_for", &self.keep_unused_for)
      .finish()
  }
}

/// One consumer's interest in a cache entry. Dropping it unsubscribes.
pub struct Subscription<T> {
  key: CacheKey,
  rx: watch::Receiver<QuerySnapshot<T>>,
  cache: QueryCache,
}

impl<T: Clone> Subscription<T> {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Current state of the entry.
  pub fn snapshot(&self) -> QuerySnapshot<T> {
    self.rx.borrow().clone()
  }

  /// Returns `true` if the entry changed since the last poll.
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    match self.rx.has_changed() {
      Ok(true) => {
        self.rx.borrow_and_update();
        true
      }
      _ => false,
    }
  }

  /// Wait for the next change.
  pub async fn changed(&mut self) -> QuerySnapshot<T> {
    // The sender lives as long as the entry, which outlives this subscriber
    let _ = self.rx.changed().await;
    self.rx.borrow_and_update().clone()
  }

  /// Wait until no request is in flight and return the settled state.
  pub async fn settled(&mut self) -> QuerySnapshot<T> {
    loop {
      {
        let snap = self.rx.borrow_and_update();
        if snap.is_settled() {
          return snap.clone();
        }
      }
      if self.rx.changed().await.is_err() {
        return self.rx.borrow().clone();
      }
    }
  }

  /// Force a new request for this entry.
  pub fn refetch(&self) {
    self.cache.refetch(&self.key);
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.cache.unsubscribe(&self.key);
  }
}

impl<T> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .finish_non_exhaustive()
  }
}
