use std::{collections::VecDeque, sync::Mutex};

use crate::common::{lock, Node};

use super::bucket::{Bucket, TrackedNode};

#[derive(Debug)]
/// First in first out bucket without liveness probes.
///
/// Only contacts that talked to us directly are admitted, a full bucket drops its oldest contact.
pub struct SlackBucket {
    capacity: usize,
    nodes: Mutex<VecDeque<TrackedNode>>,
}

impl SlackBucket {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            nodes: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }
}

impl Bucket for SlackBucket {
    fn insert(&self, node: TrackedNode) {
        if !node.has_been_contacted() || self.capacity == 0 {
            return;
        }

        let mut nodes = lock(&self.nodes);

        // Present contacts keep their place, a newer record brings its address.
        if let Some(existing) = nodes.iter_mut().find(|n| n.key() == node.key()) {
            if node.last_contact() > existing.last_contact() {
                *existing = node;
            }
            return;
        }

        if nodes.len() >= self.capacity {
            nodes.pop_front();
        }

        nodes.push_back(node);
    }

    fn mark_dead(&self, node: &Node) {
        lock(&self.nodes).retain(|n| n.key() != node.key());
    }

    fn nodes(&self) -> Vec<Node> {
        lock(&self.nodes).iter().map(|n| n.node().clone()).collect()
    }

    fn len(&self) -> usize {
        lock(&self.nodes).len()
    }
}
