//! Dependency-tracked caching.
//!
//! [`DependencyCache`] is the generic TTL + LRU cache used for aggregates
//! layered over the progress store. [`CacheKey`] and [`InvalidationScope`]
//! address store entries and cache entries alike.

mod key;
mod manager;
mod sweeper;
mod traits;

pub use key::{dependencies, tags, CacheKey, Dependencies, InvalidationScope, KeyKind};
pub use manager::{DependencyCache, WarmReport, WarmTask};
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use traits::{CacheEntry, CacheStats, InvalidationSink};
