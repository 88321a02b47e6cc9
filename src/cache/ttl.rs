use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::common::{lock, Key, Node};

use super::ResultCache;

/// Default lifetime of a [TtlCache] entry.
pub const DEFAULT_VALID_TIME: Duration = Duration::from_secs(10 * 60 * 60);

#[derive(Debug)]
/// Unbounded cache whose entries expire `valid_for` after insertion.
///
/// Expired entries are purged when searching.
pub struct TtlCache {
    valid_for: Duration,
    entries: Mutex<HashMap<Key, (Instant, Vec<Node>)>>,
}

impl TtlCache {
    pub fn new(valid_for: Duration) -> Self {
        Self {
            valid_for,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl ResultCache for TtlCache {
    fn insert(&self, key: Key, nodes: Vec<Node>) {
        lock(&self.entries).insert(key, (Instant::now(), nodes));
    }

    fn search(&self, key: &Key) -> Option<Vec<Node>> {
        let mut entries = lock(&self.entries);

        entries.retain(|_, (inserted, _)| inserted.elapsed() < self.valid_for);

        entries.get(key).map(|(_, nodes)| nodes.clone())
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn is_full(&self) -> bool {
        false
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}
