use std::{cmp::Ordering, vec::IntoIter};

use crate::common::{Key, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How "close" is measured relative to a target key.
pub enum Proximity {
    #[default]
    /// XOR distance as an unsigned big endian integer.
    Xor,
    /// Absolute difference of the keys' colors first, XOR distance as tie-break.
    Color {
        /// Number of colors the key space is partitioned into.
        nr_colors: u32,
    },
}

impl Proximity {
    /// Orders `a` and `b` by their closeness to `target`, closer first.
    ///
    /// Total over keys of the target's length: equal only when `a == b`.
    pub fn compare(&self, target: &Key, a: &Key, b: &Key) -> Ordering {
        match self {
            Proximity::Xor => xor_cmp(target, a, b),
            Proximity::Color { nr_colors } => {
                let color = target.color(*nr_colors) as i64;
                let da = (a.color(*nr_colors) as i64 - color).abs();
                let db = (b.color(*nr_colors) as i64 - color).abs();

                da.cmp(&db).then_with(|| xor_cmp(target, a, b))
            }
        }
    }
}

fn xor_cmp(target: &Key, a: &Key, b: &Key) -> Ordering {
    let target = target.as_bytes();

    for ((t, x), y) in target.iter().zip(a.as_bytes()).zip(b.as_bytes()) {
        match (x ^ t).cmp(&(y ^ t)) {
            Ordering::Equal => continue,
            ordering => return ordering,
        }
    }

    a.len().cmp(&b.len())
}

#[derive(Debug, Clone)]
/// Nodes sorted by closeness to a target, without duplicate keys.
pub struct ClosestNodes {
    target: Key,
    proximity: Proximity,
    nodes: Vec<Node>,
}

impl ClosestNodes {
    pub fn new(target: Key) -> Self {
        Self::with_proximity(target, Proximity::Xor)
    }

    pub fn with_proximity(target: Key, proximity: Proximity) -> Self {
        Self {
            target,
            proximity,
            nodes: Vec::new(),
        }
    }

    // === Getters ===

    pub fn target(&self) -> &Key {
        &self.target
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.position(key).is_ok()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    // === Public Methods ===

    /// Insert `node` at its sorted position, returns `false` if its key is already present.
    pub fn add(&mut self, node: Node) -> bool {
        match self.position(node.key()) {
            Ok(_) => false,
            Err(pos) => {
                self.nodes.insert(pos, node);
                true
            }
        }
    }

    /// Remove the node with the given key, if present.
    pub fn remove(&mut self, key: &Key) -> Option<Node> {
        self.position(key).ok().map(|pos| self.nodes.remove(pos))
    }

    /// Keep only the `n` closest nodes.
    pub fn truncate(&mut self, n: usize) {
        self.nodes.truncate(n);
    }

    pub fn into_vec(self) -> Vec<Node> {
        self.nodes
    }

    // === Private Methods ===

    fn position(&self, key: &Key) -> Result<usize, usize> {
        self.nodes
            .binary_search_by(|probe| self.proximity.compare(&self.target, probe.key(), key))
    }
}

impl Extend<Node> for ClosestNodes {
    fn extend<T: IntoIterator<Item = Node>>(&mut self, iter: T) {
        for node in iter {
            self.add(node);
        }
    }
}

impl IntoIterator for ClosestNodes {
    type Item = Node;
    type IntoIter = IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClosestNodes {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
