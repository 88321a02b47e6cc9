use std::{num::NonZeroUsize, sync::Mutex};

use crate::common::{lock, Key, Node};

use super::ResultCache;

/// Bounded least recently used cache that only keeps complete results,
/// lists of exactly `bucket_size` nodes.
pub struct LruCache {
    bucket_size: usize,
    entries: Mutex<lru::LruCache<Key, Vec<Node>>>,
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("bucket_size", &self.bucket_size)
            .field("len", &self.len())
            .finish()
    }
}

impl LruCache {
    pub fn new(capacity: usize, bucket_size: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            bucket_size,
            entries: Mutex::new(lru::LruCache::new(capacity)),
        }
    }
}

impl ResultCache for LruCache {
    fn insert(&self, key: Key, nodes: Vec<Node>) {
        if nodes.len() != self.bucket_size {
            return;
        }

        lock(&self.entries).put(key, nodes);
    }

    /// Reading an entry makes it the most recently used.
    fn search(&self, key: &Key) -> Option<Vec<Node>> {
        lock(&self.entries).get(key).cloned()
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn is_full(&self) -> bool {
        let entries = lock(&self.entries);
        entries.len() >= entries.cap().get()
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

#[cfg(test)]
mod test {
    use crate::{cache::test::nodes, common::KeyFactory};

    use super::*;

    #[test]
    fn only_full_results() {
        let factory = KeyFactory::new(4);
        let cache = LruCache::new(10, 3);

        let complete = factory.random();
        let partial = factory.random();
        let result = nodes(&factory, 3);

        cache.insert(complete.clone(), result.clone());
        cache.insert(partial.clone(), nodes(&factory, 2));

        assert_eq!(cache.search(&complete), Some(result));
        assert!(cache.search(&partial).is_none());
    }

    #[test]
    fn search_refreshes_recency() {
        let factory = KeyFactory::new(4);
        let cache = LruCache::new(2, 1);
        let (a, b, c) = (factory.random(), factory.random(), factory.random());

        cache.insert(a.clone(), nodes(&factory, 1));
        cache.insert(b.clone(), nodes(&factory, 1));
        assert!(cache.is_full());

        assert!(cache.search(&a).is_some());
        cache.insert(c.clone(), nodes(&factory, 1));

        assert!(cache.search(&a).is_some());
        assert!(cache.search(&b).is_none());
        assert!(cache.search(&c).is_some());
    }
}
