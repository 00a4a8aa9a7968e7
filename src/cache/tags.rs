//! Invalidation tags and the tag → cache key index.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::traits::CacheKey;

/// Label linking mutations to the queries they must refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
  Boards,
}

impl Tag {
  pub fn as_str(&self) -> &'static str {
    match self {
      Tag::Boards => "Boards",
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Mapping from tag to the set of cache entries currently carrying it.
#[derive(Debug, Default)]
pub struct TagIndex {
  by_tag: HashMap<Tag, HashSet<CacheKey>>,
}

impl TagIndex {
  pub fn register(&mut self, key: &CacheKey, tags: &[Tag]) {
    for tag in tags {
      self.by_tag.entry(*tag).or_default().insert(key.clone());
    }
  }

  pub fn remove(&mut self, key: &CacheKey, tags: &[Tag]) {
    for tag in tags {
      if let Some(keys) = self.by_tag.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
          self.by_tag.remove(tag);
        }
      }
    }
  }

  /// Union of keys tagged with any of `tags`.
  pub fn keys_for(&self, tags: &[Tag]) -> HashSet<CacheKey> {
    tags
      .iter()
      .filter_map(|tag| self.by_tag.get(tag))
      .flat_map(|keys| keys.iter().cloned())
      .collect()
  }

  pub fn count(&self, tag: Tag) -> usize {
    self.by_tag.get(&tag).map_or(0, HashSet::len)
  }
}
