//! Kademlia's ping verified bucket.

use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::{debug, trace};

use crate::{
    common::{lock, Node},
    rpc::Pinger,
};

use super::bucket::{Bucket, TrackedNode};

/// Keeps long lived contacts: a full bucket only evicts its least recently seen
/// contact after that contact fails a liveness probe.
pub struct StableBucket {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    valid_timespan: Duration,
    pinger: Pinger,
    /// Least recently seen first.
    nodes: Mutex<Vec<Arc<TrackedNode>>>,
}

impl Debug for StableBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableBucket")
            .field("capacity", &self.inner.capacity)
            .field("nodes", &self.nodes())
            .finish()
    }
}

impl StableBucket {
    /// `valid_timespan` is how long a contact counts as alive after we last heard from it.
    pub fn new(capacity: usize, valid_timespan: Duration, pinger: Pinger) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                valid_timespan,
                pinger,
                nodes: Mutex::new(Vec::with_capacity(capacity)),
            }),
        }
    }
}

impl Bucket for StableBucket {
    fn insert(&self, node: TrackedNode) {
        let mut nodes = lock(&self.inner.nodes);

        if let Some(pos) = nodes.iter().position(|n| n.key() == node.key()) {
            // The newer record wins, along with its address.
            if node.last_contact() > nodes[pos].last_contact() {
                let existing = nodes.remove(pos);
                if existing.is_being_pinged() {
                    node.lock_for_ping();
                }
                nodes.push(Arc::new(node));
            }
            return;
        }

        if nodes.len() < self.inner.capacity {
            nodes.push(Arc::new(node));
            return;
        }

        if !node.has_been_contacted() {
            trace!(node = ?node.node(), "Bucket full, ignoring uncontacted node");
            return;
        }

        let Some(oldest) = nodes.first().cloned() else {
            return;
        };

        if !oldest.has_been_contacted() {
            nodes.remove(0);
            nodes.push(Arc::new(node));
            return;
        }

        if oldest.contacted_within(self.inner.valid_timespan) {
            return;
        }

        if !oldest.lock_for_ping() {
            return;
        }

        drop(nodes);

        let inner = self.inner.clone();
        let candidate = Arc::new(node);
        let probed = oldest.clone();
        let last_seen = oldest.last_contact();

        let submitted = self
            .inner
            .pinger
            .probe(oldest.node().clone(), move |answered| {
                inner.on_probe(&probed, last_seen, candidate, answered)
            });

        if let Err(error) = submitted {
            debug!(?error, "Could not probe least recently seen node");
            self.inner.release_ping_lock(&oldest);
        }
    }

    fn mark_dead(&self, node: &Node) {
        let mut nodes = lock(&self.inner.nodes);

        if let Some(pos) = nodes.iter().position(|n| n.key() == node.key()) {
            let dead = nodes.remove(pos);
            dead.reset_contact();
            nodes.insert(0, dead);
        }
    }

    fn nodes(&self) -> Vec<Node> {
        lock(&self.inner.nodes)
            .iter()
            .map(|n| n.node().clone())
            .collect()
    }

    fn len(&self) -> usize {
        lock(&self.inner.nodes).len()
    }
}

impl Inner {
    /// `last_seen` is the probed contact's last contact when the probe was sent,
    /// a newer record seen since then counts as an answer.
    fn on_probe(
        &self,
        probed: &Arc<TrackedNode>,
        last_seen: u64,
        candidate: Arc<TrackedNode>,
        answered: bool,
    ) {
        let mut nodes = lock(&self.nodes);

        if let Some(pos) = nodes.iter().position(|n| n.key() == probed.key()) {
            let current = nodes.remove(pos);

            if answered {
                current.set_contacted_now();
            }

            if answered || current.last_contact() > last_seen {
                nodes.push(current.clone());
            } else if nodes.iter().any(|n| n.key() == candidate.key())
                || nodes.len() >= self.capacity
            {
                nodes.insert(0, current.clone());
            } else {
                debug!(
                    evicted = ?current.node(),
                    node = ?candidate.node(),
                    "Replacing unresponsive node"
                );
                nodes.push(candidate);
            }

            current.release_ping_lock();
        }

        probed.release_ping_lock();
    }

    /// Release the probe lock of `probed` and of any newer record that took its place.
    fn release_ping_lock(&self, probed: &TrackedNode) {
        if let Some(current) = lock(&self.nodes).iter().find(|n| n.key() == probed.key()) {
            current.release_ping_lock();
        }

        probed.release_ping_lock();
    }
}
