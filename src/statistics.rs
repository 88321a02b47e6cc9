//! Instrumentation hooks.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::common::Message;

/// Receives events from a node's components.
///
/// Every method defaults to doing nothing, implement only what you need and
/// pass it to [crate::DhtBuilder::observer].
pub trait Observer: Debug + Send + Sync {
    /// A message arrived from the transport.
    fn incoming_message(&self, _message: &Message) {}
    /// A liveness probe was sent.
    fn ping_sent(&self) {}
    /// A lookup was answered by the local result cache.
    fn local_cache_hit(&self) {}
    /// A lookup was answered by a remote node's result cache.
    fn remote_cache_hit(&self) {}
    /// A find node request was answered from the local cache.
    fn find_node_cache_hit(&self) {}
    /// A find node request asked for the cache but it missed.
    fn find_node_cache_miss(&self) {}
    /// A lookup finished after querying `queried` nodes.
    fn lookup_completed(&self, _queried: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
/// Observer that ignores everything.
pub struct NoopObserver;

impl Observer for NoopObserver {}

#[derive(Debug, Default)]
/// Counters for every [Observer] event.
pub struct Statistics {
    incoming_messages: AtomicU64,
    pings_sent: AtomicU64,
    local_cache_hits: AtomicU64,
    remote_cache_hits: AtomicU64,
    find_node_cache_hits: AtomicU64,
    find_node_cache_misses: AtomicU64,
    lookups: AtomicU64,
    nodes_queried: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    // === Getters ===

    pub fn incoming_messages(&self) -> u64 {
        self.incoming_messages.load(Ordering::Relaxed)
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    pub fn local_cache_hits(&self) -> u64 {
        self.local_cache_hits.load(Ordering::Relaxed)
    }

    pub fn remote_cache_hits(&self) -> u64 {
        self.remote_cache_hits.load(Ordering::Relaxed)
    }

    pub fn find_node_cache_hits(&self) -> u64 {
        self.find_node_cache_hits.load(Ordering::Relaxed)
    }

    pub fn find_node_cache_misses(&self) -> u64 {
        self.find_node_cache_misses.load(Ordering::Relaxed)
    }

    /// Number of completed lookups.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Average number of nodes queried per lookup, a hop count estimate.
    pub fn average_queried(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            return 0.0;
        }

        self.nodes_queried.load(Ordering::Relaxed) as f64 / lookups as f64
    }
}

impl Observer for Statistics {
    fn incoming_message(&self, _message: &Message) {
        self.incoming_messages.fetch_add(1, Ordering::Relaxed);
    }

    fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn local_cache_hit(&self) {
        self.local_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn remote_cache_hit(&self) {
        self.remote_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn find_node_cache_hit(&self) {
        self.find_node_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn find_node_cache_miss(&self) {
        self.find_node_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn lookup_completed(&self, queried: usize) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.nodes_queried
            .fetch_add(queried as u64, Ordering::Relaxed);
    }
}
