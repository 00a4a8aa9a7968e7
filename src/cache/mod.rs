//! Query cache with tag-based invalidation.
//!
//! This module provides a transport-agnostic cache that:
//! - Keys entries by endpoint name + argument, so identical queries share one entry
//! - Deduplicates in-flight requests per key
//! - Tracks which entries provide which tags and refetches them on invalidation
//! - Evicts entries once they have had no subscribers for a retention period

mod store;
mod tags;
mod traits;

pub use store::{BoxFetch, QueryCache, Subscription, DEFAULT_KEEP_UNUSED_FOR};
pub use tags::{Tag, TagIndex};
pub use traits::{CacheKey, QueryKey, QueryOptions, RefetchPolicy};
