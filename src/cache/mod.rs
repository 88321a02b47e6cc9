//! Memo of lookup results, key to closest nodes.
//!
//! A best effort optimization: entries may be stale and are never needed for correctness.

use std::time::Duration;

use crate::common::{Key, Node};

mod color;
mod fifo;
mod lru;
mod ttl;

pub use color::ColorCache;
pub use fifo::FifoCache;
pub use self::lru::LruCache;
pub use ttl::{TtlCache, DEFAULT_VALID_TIME};

/// Default number of cached lookups.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Storage of lookup results.
///
/// Entries are replaced wholesale when the same key is inserted again.
pub trait ResultCache: Send + Sync {
    fn insert(&self, key: Key, nodes: Vec<Node>);

    fn search(&self, key: &Key) -> Option<Vec<Node>>;

    fn clear(&self);

    /// Returns `true` if inserting a new key would evict another.
    fn is_full(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: ResultCache + ?Sized> ResultCache for Box<C> {
    fn insert(&self, key: Key, nodes: Vec<Node>) {
        (**self).insert(key, nodes)
    }

    fn search(&self, key: &Key) -> Option<Vec<Node>> {
        (**self).search(key)
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn is_full(&self) -> bool {
        (**self).is_full()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

#[derive(Debug, Default, Clone, Copy)]
/// Caches nothing, every search misses.
pub struct NoopCache;

impl ResultCache for NoopCache {
    fn insert(&self, _key: Key, _nodes: Vec<Node>) {}

    fn search(&self, _key: &Key) -> Option<Vec<Node>> {
        None
    }

    fn clear(&self) {}

    fn is_full(&self) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Which [ResultCache] a node uses.
pub enum CachePolicy {
    /// [NoopCache]
    None,
    /// [FifoCache]
    Fifo,
    #[default]
    /// [LruCache], only caching complete results.
    Lru,
    /// [TtlCache]
    Ttl,
}

#[derive(Debug, Clone, Copy)]
/// Everything needed to build a [ResultCache] from a [CachePolicy].
pub struct CacheOptions {
    pub policy: CachePolicy,
    /// Maximum number of entries of bounded caches.
    pub size: usize,
    /// Entry lifetime of the [TtlCache].
    pub valid_time: Duration,
    /// Only full-size results are cached by the [LruCache].
    pub bucket_size: usize,
    /// Wrap the cache in a [ColorCache] with this many colors.
    pub nr_colors: Option<u32>,
}

impl CacheOptions {
    /// Build the configured cache for a node with key `local`.
    pub fn build(&self, local: &Key) -> Box<dyn ResultCache> {
        let cache: Box<dyn ResultCache> = match self.policy {
            CachePolicy::None => Box::new(NoopCache),
            CachePolicy::Fifo => Box::new(FifoCache::new(self.size)),
            CachePolicy::Lru => Box::new(LruCache::new(self.size, self.bucket_size)),
            CachePolicy::Ttl => Box::new(TtlCache::new(self.valid_time)),
        };

        match self.nr_colors {
            Some(nr_colors) => Box::new(ColorCache::new(cache, local, nr_colors)),
            None => cache,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use crate::common::KeyFactory;

    use super::*;

    pub(crate) fn nodes(factory: &KeyFactory, n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| Node::new(factory.random(), ([127, 0, 0, 1], i as u16).into()))
            .collect()
    }

    #[test]
    fn noop_cache_never_hits() {
        let factory = KeyFactory::new(4);
        let cache = NoopCache;

        let key = factory.random();
        cache.insert(key.clone(), nodes(&factory, 3));

        assert!(cache.search(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn build_from_options() {
        let factory = KeyFactory::new(4);
        let local = factory.random();

        let options = CacheOptions {
            policy: CachePolicy::Fifo,
            size: 2,
            valid_time: Duration::from_secs(60),
            bucket_size: 3,
            nr_colors: Some(4),
        };
        let cache = options.build(&local);

        let key = factory.random();
        cache.insert(key.clone(), nodes(&factory, 1));
        assert_eq!(cache.search(&key).map(|n| n.len()), Some(1));

        let lru = CacheOptions {
            policy: CachePolicy::Lru,
            nr_colors: None,
            ..options
        }
        .build(&local);

        lru.insert(key.clone(), nodes(&factory, 1));
        assert!(lru.search(&key).is_none());
    }
}
