//! Bucket policies share this interface.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::common::{Key, Node};

/// A capacity bounded group of contacts, deciding which contacts to admit and evict.
///
/// Implementations lock internally, so buckets of one table never block each other.
pub trait Bucket: Send + Sync {
    /// Offer a contact to this bucket.
    fn insert(&self, node: TrackedNode);

    /// A contact failed to respond.
    fn mark_dead(&self, node: &Node);

    /// Contacts, least recently seen first.
    fn nodes(&self) -> Vec<Node>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, key: &Key) -> bool {
        self.nodes().iter().any(|node| node.key() == key)
    }
}

#[derive(Debug)]
/// A routing table entry: a contact, when it was last heard from, and whether it is being probed.
pub struct TrackedNode {
    node: Node,
    /// Milliseconds since the UNIX epoch, 0 for never.
    last_contact: AtomicU64,
    being_pinged: AtomicBool,
}

impl TrackedNode {
    /// A contact we only heard about from a third party.
    pub fn new(node: Node) -> Self {
        Self::with_last_contact(node, 0)
    }

    /// A contact that just sent us a message.
    pub fn contacted(node: Node) -> Self {
        Self::with_last_contact(node, now_millis())
    }

    pub(crate) fn with_last_contact(node: Node, last_contact: u64) -> Self {
        Self {
            node,
            last_contact: AtomicU64::new(last_contact),
            being_pinged: AtomicBool::new(false),
        }
    }

    // === Getters ===

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn key(&self) -> &Key {
        self.node.key()
    }

    /// Milliseconds since the UNIX epoch of the last contact, 0 if never contacted.
    pub fn last_contact(&self) -> u64 {
        self.last_contact.load(Ordering::Acquire)
    }

    pub fn has_been_contacted(&self) -> bool {
        self.last_contact() != 0
    }

    /// Returns `true` if the last contact is more recent than `span` ago.
    pub fn contacted_within(&self, span: Duration) -> bool {
        self.has_been_contacted()
            && now_millis().saturating_sub(self.last_contact()) < span.as_millis() as u64
    }

    pub fn is_being_pinged(&self) -> bool {
        self.being_pinged.load(Ordering::Acquire)
    }

    // === Public Methods ===

    pub fn set_contacted_now(&self) {
        self.last_contact.store(now_millis(), Ordering::Release);
    }

    pub fn reset_contact(&self) {
        self.last_contact.store(0, Ordering::Release);
    }

    /// Take the probe lock, returns `false` if a probe is already in flight.
    pub fn lock_for_ping(&self) -> bool {
        self.being_pinged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_ping_lock(&self) {
        self.being_pinged.store(false, Ordering::Release);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
        .max(1)
}

#[derive(Debug, Default)]
/// Stores nothing.
pub struct NoopBucket;

impl Bucket for NoopBucket {
    fn insert(&self, _node: TrackedNode) {}

    fn mark_dead(&self, _node: &Node) {}

    fn nodes(&self) -> Vec<Node> {
        Vec::new()
    }

    fn len(&self) -> usize {
        0
    }
}
