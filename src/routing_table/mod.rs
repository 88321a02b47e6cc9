//! Kademlia routing table

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
    time::Duration,
};

use tracing::{trace, warn};

use crate::{
    common::{ClosestNodes, Key, KeyFactory, MessageKind, MessageType, Node, Proximity},
    rpc::{Dispatcher, MessageFilter, Pinger, Registration},
};

mod bucket;
mod slack;
mod stable;

pub use bucket::{Bucket, NoopBucket, TrackedNode};
pub use slack::SlackBucket;
pub use stable::StableBucket;

/// K = the default maximum size of a bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Which [Bucket] implementation a routing table uses.
pub enum BucketPolicy {
    #[default]
    /// [StableBucket]
    Stable,
    /// [SlackBucket]
    Slack,
    /// [NoopBucket]
    Noop,
}

impl BucketPolicy {
    pub fn build(
        &self,
        capacity: usize,
        valid_timespan: Duration,
        pinger: &Pinger,
    ) -> Box<dyn Bucket> {
        match self {
            BucketPolicy::Stable => Box::new(StableBucket::new(
                capacity,
                valid_timespan,
                pinger.clone(),
            )),
            BucketPolicy::Slack => Box::new(SlackBucket::new(capacity)),
            BucketPolicy::Noop => Box::new(NoopBucket),
        }
    }
}

/// Kademlia routing table: one bucket per bit of the key, a contact lives in the bucket
/// indexed by the most significant bit where its key differs from ours.
pub struct RoutingTable {
    local: Node,
    bucket_size: usize,
    nr_colors: u32,
    key_factory: KeyFactory,
    buckets: Vec<Box<dyn Bucket>>,
}

impl Debug for RoutingTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("local", &self.local)
            .field("bucket_size", &self.bucket_size)
            .field("size", &self.size())
            .finish()
    }
}

impl RoutingTable {
    /// Create a routing table for `local`, building each bucket with `make_bucket(index)`.
    pub fn new<F>(local: Node, bucket_size: usize, nr_colors: u32, make_bucket: F) -> Self
    where
        F: FnMut(usize) -> Box<dyn Bucket>,
    {
        let key_factory = KeyFactory::new(local.key().len());
        let buckets = (0..local.key().bit_length()).map(make_bucket).collect();

        Self {
            local,
            bucket_size,
            nr_colors,
            key_factory,
            buckets,
        }
    }

    // === Getters ===

    /// The local node, distances are measured from its key.
    pub fn local(&self) -> &Node {
        &self.local
    }

    /// Maximum number of contacts per bucket.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Contacts of one bucket, least recently seen first.
    pub fn bucket_nodes(&self, index: usize) -> Vec<Node> {
        self.buckets
            .get(index)
            .map(|bucket| bucket.nodes())
            .unwrap_or_default()
    }

    /// Index of the bucket a key belongs to, `None` for the local key.
    pub fn bucket_index(&self, key: &Key) -> Option<usize> {
        key.xor(self.local.key()).ok()?.first_set_bit_index()
    }

    /// Return the number of nodes in this routing table.
    pub fn size(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.is_empty())
    }

    /// Every contact in the table, for snapshots.
    pub fn nodes(&self) -> Vec<Node> {
        self.buckets.iter().flat_map(|bucket| bucket.nodes()).collect()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.bucket_index(key)
            .and_then(|index| self.buckets.get(index))
            .is_some_and(|bucket| bucket.contains(key))
    }

    // === Public Methods ===

    /// Offer a contact to its bucket. Our own key is ignored.
    pub fn insert(&self, node: TrackedNode) {
        match self.bucket_index(node.key()) {
            Some(index) => {
                if let Some(bucket) = self.buckets.get(index) {
                    bucket.insert(node)
                }
            }
            None if node.key() == self.local.key()
                && node.node().address() != self.local.address() =>
            {
                warn!(node = ?node.node(), "Dropping contact sharing our key")
            }
            None => trace!(node = ?node.node(), "Not inserting local key into routing table"),
        }
    }

    /// Tell the owning bucket that `node` did not respond.
    pub fn mark_dead(&self, node: &Node) {
        if let Some(bucket) = self
            .bucket_index(node.key())
            .and_then(|index| self.buckets.get(index))
        {
            bucket.mark_dead(node)
        }
    }

    /// Up to `n` known contacts closest to `key` by XOR distance.
    pub fn closest_nodes_by_key(&self, key: &Key, n: usize) -> Vec<Node> {
        self.closest(key, n, Proximity::Xor)
    }

    /// Up to `n` known contacts closest to `key` by color, then by XOR distance.
    pub fn closest_nodes_by_color(&self, key: &Key, n: usize) -> Vec<Node> {
        self.closest(
            key,
            n,
            Proximity::Color {
                nr_colors: self.nr_colors,
            },
        )
    }

    /// Contacts of the bucket `key` belongs to, unsorted.
    pub fn all_from_bucket(&self, key: &Key) -> Vec<Node> {
        self.bucket_index(key)
            .map(|index| self.bucket_nodes(index))
            .unwrap_or_default()
    }

    /// One random key per bucket, landing in that bucket, for refreshing the table.
    pub fn random_keys_for_all_buckets(&self) -> Vec<Key> {
        (0..self.buckets.len())
            .filter_map(|index| {
                self.key_factory
                    .random_in_bucket(self.local.key(), index)
                    .ok()
            })
            .collect()
    }

    /// Feed the sender of every incoming message, and every contact carried by find node
    /// responses, into this table.
    ///
    /// Pongs are skipped, bucket probes handle them.
    pub fn register_incoming_message_handler(
        self: &Arc<Self>,
        dispatcher: &Dispatcher,
    ) -> Registration {
        let table = Arc::downgrade(self);

        dispatcher
            .request()
            .consumable(false)
            .filter(MessageFilter::TypeExcluder(MessageType::Pong))
            .filter(MessageFilter::SrcExcluder(self.local.key().clone()))
            .callback(move |result| {
                let (Some(table), Ok(message)) = (table.upgrade(), result) else {
                    return;
                };

                table.insert(TrackedNode::contacted(message.src.clone()));

                if let MessageKind::FindNodeResponse(response) = &message.kind {
                    for node in &response.nodes {
                        table.insert(TrackedNode::new(node.clone()));
                    }
                }
            })
            .register()
    }

    // === Private Methods ===

    fn closest(&self, key: &Key, n: usize, proximity: Proximity) -> Vec<Node> {
        let mut closest = ClosestNodes::with_proximity(key.clone(), proximity);
        closest.extend(self.gather(key, n));
        closest.truncate(n);

        closest.into_vec()
    }

    /// Collect from the home bucket of `key` outwards, alternating sides,
    /// until at least `n` contacts are found or every bucket was visited.
    fn gather(&self, key: &Key, n: usize) -> Vec<Node> {
        let count = self.buckets.len();
        if count == 0 {
            return Vec::new();
        }

        let index = self.bucket_index(key).unwrap_or(0).min(count - 1);

        let mut gathered = self.buckets[index].nodes();
        let mut step = 1;

        while gathered.len() < n && (index + step < count || step <= index) {
            if index + step < count {
                gathered.extend(self.buckets[index + step].nodes());
            }
            if step <= index {
                gathered.extend(self.buckets[index - step].nodes());
            }
            step += 1;
        }

        gathered
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashSet, time::Duration};

    use crate::{
        common::{FindNodeResponse, Message},
        rpc::{dispatcher::test::Recorder, WorkerPool},
        statistics::NoopObserver,
    };

    use super::*;

    fn table(
        key_length: usize,
        bucket_size: usize,
        policy: BucketPolicy,
    ) -> (Arc<RoutingTable>, Dispatcher) {
        let factory = KeyFactory::new(key_length);
        let local = Node::new(factory.random(), ([127, 0, 0, 1], 6881).into());

        let dispatcher =
            Dispatcher::new(Arc::new(Recorder::default()), 3, Duration::from_millis(100)).unwrap();
        let pinger = Pinger::new(
            local.clone(),
            dispatcher.clone(),
            Arc::new(WorkerPool::new("ping-test", 1, 4).unwrap()),
            Duration::from_millis(100),
            Arc::new(NoopObserver),
        );

        let table = RoutingTable::new(local, bucket_size, 10, |_| {
            policy.build(bucket_size, Duration::from_secs(3600), &pinger)
        });

        (Arc::new(table), dispatcher)
    }

    fn random_node(factory: &KeyFactory, port: u16) -> Node {
        Node::new(factory.random(), ([127, 0, 0, 1], port).into())
    }

    #[test]
    fn local_key_is_never_stored() {
        let (table, _) = table(2, 20, BucketPolicy::Stable);

        table.insert(TrackedNode::contacted(table.local().clone()));

        assert!(table.is_empty());
        assert_eq!(table.bucket_index(table.local().key()), None);
        assert!(table.all_from_bucket(table.local().key()).is_empty());
    }

    #[test]
    fn placement() {
        let (table, _) = table(2, 20, BucketPolicy::Stable);
        let factory = KeyFactory::new(2);

        for port in 0..100 {
            let node = random_node(&factory, port);
            if node.key() == table.local().key() {
                continue;
            }

            table.insert(TrackedNode::contacted(node.clone()));

            let index = node.key().xor(table.local().key()).unwrap().first_set_bit_index();
            assert_eq!(table.bucket_index(node.key()), index);

            if table.contains(node.key()) {
                assert!(table.all_from_bucket(node.key()).contains(&node));
            }
        }

        for index in 0..table.bucket_count() {
            for node in table.bucket_nodes(index) {
                assert_eq!(table.bucket_index(node.key()), Some(index));
            }
        }
    }

    #[test]
    fn bucket_capacity() {
        let (table, _) = table(2, 3, BucketPolicy::Stable);
        let factory = KeyFactory::new(2);

        let nodes: Vec<Node> = (0..300).map(|port| random_node(&factory, port)).collect();

        for _ in 0..3 {
            for node in &nodes {
                table.insert(TrackedNode::contacted(node.clone()));
            }
        }

        for index in 0..table.bucket_count() {
            assert!(table.bucket_nodes(index).len() <= 3);
        }
    }

    #[test]
    fn closest_nodes_by_key() {
        let (table, _) = table(2, 20, BucketPolicy::Stable);
        let factory = KeyFactory::new(2);

        for port in 0..40 {
            table.insert(TrackedNode::contacted(random_node(&factory, port)));
        }

        let target = factory.random();

        for n in [1, 5, 20, 1000] {
            let closest = table.closest_nodes_by_key(&target, n);

            assert_eq!(closest.len(), n.min(table.size()));

            let unique: HashSet<_> = closest.iter().map(|node| node.key().clone()).collect();
            assert_eq!(unique.len(), closest.len());

            let distances: Vec<Key> = closest
                .iter()
                .map(|node| node.key().xor(&target).unwrap())
                .collect();
            let mut sorted = distances.clone();
            sorted.sort();
            assert_eq!(distances, sorted);
        }

        // Asking for everything visits every bucket, so the result is exact.
        let mut expected = table.nodes();
        expected.sort_by_key(|node| node.key().xor(&target).unwrap());
        assert_eq!(table.closest_nodes_by_key(&target, 1000), expected);
    }

    #[test]
    fn closest_nodes_by_color() {
        let (table, _) = table(2, 20, BucketPolicy::Stable);
        let factory = KeyFactory::new(2);

        for port in 0..40 {
            table.insert(TrackedNode::contacted(random_node(&factory, port)));
        }

        let target = factory.random();
        let color = target.color(10) as i64;

        let closest = table.closest_nodes_by_color(&target, 1000);
        let color_distances: Vec<i64> = closest
            .iter()
            .map(|node| (node.key().color(10) as i64 - color).abs())
            .collect();

        let mut sorted = color_distances.clone();
        sorted.sort();
        assert_eq!(color_distances, sorted);
    }

    #[test]
    fn random_keys_for_all_buckets() {
        let (table, _) = table(3, 20, BucketPolicy::Stable);

        let keys = table.random_keys_for_all_buckets();
        assert_eq!(keys.len(), 24);

        for (index, key) in keys.iter().enumerate() {
            assert_eq!(table.bucket_index(key), Some(index));
        }
    }

    #[test]
    fn incoming_message_handler() {
        let (table, dispatcher) = table(2, 20, BucketPolicy::Slack);
        let factory = KeyFactory::new(2);

        let _registration = table.register_incoming_message_handler(&dispatcher);

        let sender = random_node(&factory, 1);
        let carried = random_node(&factory, 2);
        let ponger = random_node(&factory, 3);

        dispatcher.dispatch(&Message::new(1, ponger.clone(), MessageKind::Pong));
        assert!(!table.contains(ponger.key()));

        dispatcher.dispatch(&Message::new(
            2,
            sender.clone(),
            MessageKind::FindNodeResponse(FindNodeResponse {
                nodes: vec![carried.clone()],
                cached_results: false,
            }),
        ));

        assert!(table.contains(sender.key()) || sender.key() == table.local().key());
        // Slack buckets ignore contacts we never talked to.
        assert!(!table.contains(carried.key()));

        dispatcher.dispatch(&Message::new(3, table.local().clone(), MessageKind::Ping));
        assert!(!table.contains(table.local().key()));
    }

    #[test]
    fn mark_dead() {
        let (table, _) = table(2, 20, BucketPolicy::Slack);
        let factory = KeyFactory::new(2);

        let node = loop {
            let node = random_node(&factory, 1);
            if node.key() != table.local().key() {
                break node;
            }
        };

        table.insert(TrackedNode::contacted(node.clone()));
        assert!(table.contains(node.key()));

        table.mark_dead(&node);
        assert!(!table.contains(node.key()));
    }
}
