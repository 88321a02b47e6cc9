use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use crate::common::{lock, Key, Node};

use super::ResultCache;

#[derive(Debug)]
/// Bounded cache evicting the oldest inserted entry.
pub struct FifoCache {
    capacity: usize,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Key, Vec<Node>>,
    /// Oldest first.
    order: VecDeque<Key>,
}

impl FifoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State::default()),
        }
    }
}

impl ResultCache for FifoCache {
    fn insert(&self, key: Key, nodes: Vec<Node>) {
        if self.capacity == 0 {
            return;
        }

        let mut state = lock(&self.state);

        if state.entries.remove(&key).is_some() {
            state.order.retain(|k| k != &key);
        }

        while state.entries.len() >= self.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, nodes);
    }

    fn search(&self, key: &Key) -> Option<Vec<Node>> {
        lock(&self.state).entries.get(key).cloned()
    }

    fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.order.clear();
    }

    fn is_full(&self) -> bool {
        lock(&self.state).entries.len() >= self.capacity
    }

    fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }
}
