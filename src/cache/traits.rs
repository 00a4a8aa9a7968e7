//! Core traits and types for the query cache.

use std::fmt;

use super::tags::Tag;

/// Deterministic identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn new(hash: impl Into<String>) -> Self {
    Self(hash.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Trait for query identities that can address a cache entry.
///
/// Two keys with the same endpoint and argument must produce the same
/// `cache_hash`, so repeated subscriptions land on one entry.
pub trait QueryKey {
  /// Stable hash derived from endpoint name + argument
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs
  fn description(&self) -> String;

  fn cache_key(&self) -> CacheKey {
    CacheKey::new(self.cache_hash())
  }
}

/// When a subscription should trigger a network call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefetchPolicy {
  /// Reuse cached data until the entry is invalidated or errored
  #[default]
  CacheFirst,
  /// Fetch on every new subscription, sharing only an in-flight request
  OnSubscribe,
}

/// Per-endpoint cache behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
  /// Tags this query provides
  pub tags: &'static [Tag],
  pub policy: RefetchPolicy,
}
