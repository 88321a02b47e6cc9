use tracing::trace;

use crate::common::{Key, Node};

use super::ResultCache;

#[derive(Debug)]
/// Admission filter over another cache: once the inner cache is full, only keys with
/// the local node's color are accepted.
pub struct ColorCache<C> {
    inner: C,
    nr_colors: u32,
    local_color: u32,
}

impl<C: ResultCache> ColorCache<C> {
    pub fn new(inner: C, local: &Key, nr_colors: u32) -> Self {
        Self {
            inner,
            nr_colors,
            local_color: local.color(nr_colors),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ResultCache> ResultCache for ColorCache<C> {
    fn insert(&self, key: Key, nodes: Vec<Node>) {
        if self.inner.is_full() && key.color(self.nr_colors) != self.local_color {
            trace!(%key, "Cache full, rejecting key of another color");
            return;
        }

        self.inner.insert(key, nodes)
    }

    fn search(&self, key: &Key) -> Option<Vec<Node>> {
        self.inner.search(key)
    }

    fn clear(&self) {
        self.inner.clear()
    }

    fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        cache::{test::nodes, FifoCache},
        common::KeyFactory,
    };

    use super::*;

    #[test]
    fn full_cache_only_admits_local_color() {
        let factory = KeyFactory::new(1);
        let local = factory.from_bytes([3]).unwrap();

        let cache = ColorCache::new(FifoCache::new(1), &local, 4);

        let other = factory.from_bytes([1]).unwrap();
        cache.insert(other.clone(), nodes(&factory, 1));
        assert!(cache.search(&other).is_some());

        let rejected = factory.from_bytes([2]).unwrap();
        cache.insert(rejected.clone(), nodes(&factory, 1));
        assert!(cache.search(&rejected).is_none());
        assert!(cache.search(&other).is_some());

        let same_color = factory.from_bytes([7]).unwrap();
        cache.insert(same_color.clone(), nodes(&factory, 1));
        assert!(cache.search(&same_color).is_some());
        assert!(cache.search(&other).is_none());
    }
}
