//! Dht node.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use crate::{
    cache::{CachePolicy, ResultCache},
    common::{Key, KeyFactory, Message, Node},
    routing_table::{BucketPolicy, RoutingTable},
    rpc::{Config, Dispatcher, LookupResult, LookupStrategy, Rpc, Transport},
    statistics::{NoopObserver, Observer},
    Result,
};

#[derive(Debug, Clone)]
/// A node of the overlay.
///
/// Cloning is cheap, the node shuts down once every clone is dropped.
pub struct Dht(pub(crate) Arc<Rpc>);

impl Dht {
    /// Create a new [DhtBuilder].
    pub fn builder() -> DhtBuilder {
        DhtBuilder::default()
    }

    // === Getters ===

    /// This node as other nodes see it.
    pub fn local(&self) -> &Node {
        self.0.local()
    }

    pub fn config(&self) -> &Config {
        self.0.config()
    }

    pub fn routing_table(&self) -> &RoutingTable {
        self.0.routing_table()
    }

    /// Correlated requests and durable registrations, for protocols layered on top.
    pub fn dispatcher(&self) -> &Dispatcher {
        self.0.dispatcher()
    }

    pub fn cache(&self) -> &dyn ResultCache {
        self.0.cache()
    }

    /// Every contact in the routing table, for persisting and bootstrapping later.
    pub fn to_bootstrap(&self) -> Vec<SocketAddr> {
        self.0
            .routing_table()
            .nodes()
            .iter()
            .map(|node| node.address())
            .collect()
    }

    // === Public Methods ===

    /// Hand a message received by the transport to this node.
    pub fn handle_incoming(&self, message: Message) {
        self.0.handle_incoming(message)
    }

    /// Ping every bootstrap address and fill the routing table.
    ///
    /// Fails with [crate::Error::BootstrapFailed] if none of them answered.
    pub fn join(&self, bootstrap: &[SocketAddr]) -> Result<()> {
        self.0.join(bootstrap)
    }

    /// Find the closest nodes to `key`.
    ///
    /// Fails only for a key of the wrong length, unreachable nodes make the result smaller,
    /// down to this node alone.
    pub fn find_node(&self, key: &Key) -> Result<LookupResult> {
        self.0.find_node(key)
    }

    /// Like [Self::find_node], also starting from the given contacts.
    pub fn find_node_with_bootstrap(&self, key: &Key, bootstrap: &[Node]) -> Result<LookupResult> {
        self.0.find_node_with_bootstrap(key, bootstrap)
    }

    /// Ping `node` and block until it answers.
    pub fn ping(&self, node: &Node) -> Result<Message> {
        self.0.ping(node)
    }

    /// Stop answering requests and fail every pending one.
    pub fn shutdown(&self) {
        self.0.shutdown()
    }
}

#[derive(Debug, Default, Clone)]
/// Create a [Dht] node.
pub struct DhtBuilder {
    config: Config,
    key: Option<Key>,
    endpoints: Vec<(String, u16)>,
    observer: Option<Arc<dyn Observer>>,
}

impl DhtBuilder {
    /// Set this node's key instead of a random one.
    pub fn key(&mut self, key: Key) -> &mut Self {
        self.key = Some(key);

        self
    }

    /// Set [Config::key_length]
    pub fn key_length(&mut self, key_length: usize) -> &mut Self {
        self.config.key_length = key_length;

        self
    }

    /// Set [Config::bucket_size]
    pub fn bucket_size(&mut self, bucket_size: usize) -> &mut Self {
        self.config.bucket_size = bucket_size;

        self
    }

    /// Set [Config::nr_colors]
    pub fn nr_colors(&mut self, nr_colors: u32) -> &mut Self {
        self.config.nr_colors = nr_colors;

        self
    }

    /// Set [Config::alpha]
    pub fn alpha(&mut self, alpha: usize) -> &mut Self {
        self.config.alpha = alpha;

        self
    }

    /// Set [Config::concurrency]
    pub fn concurrency(&mut self, concurrency: usize) -> &mut Self {
        self.config.concurrency = concurrency;

        self
    }

    /// Set [Config::request_timeout]
    pub fn request_timeout(&mut self, request_timeout: Duration) -> &mut Self {
        self.config.request_timeout = request_timeout;

        self
    }

    /// Set [Config::bucket_policy]
    pub fn bucket_policy(&mut self, bucket_policy: BucketPolicy) -> &mut Self {
        self.config.bucket_policy = bucket_policy;

        self
    }

    /// Set [Config::bucket_valid_timespan]
    pub fn bucket_valid_timespan(&mut self, timespan: Duration) -> &mut Self {
        self.config.bucket_valid_timespan = timespan;

        self
    }

    /// Set [Config::cache_policy]
    pub fn cache_policy(&mut self, cache_policy: CachePolicy) -> &mut Self {
        self.config.cache_policy = cache_policy;

        self
    }

    /// Set [Config::cache_size]
    pub fn cache_size(&mut self, cache_size: usize) -> &mut Self {
        self.config.cache_size = cache_size;

        self
    }

    /// Set [Config::color_gated_cache]
    pub fn color_gated_cache(&mut self, color_gated_cache: bool) -> &mut Self {
        self.config.color_gated_cache = color_gated_cache;

        self
    }

    /// Set [Config::lookup_strategy]
    pub fn lookup_strategy(&mut self, lookup_strategy: LookupStrategy) -> &mut Self {
        self.config.lookup_strategy = lookup_strategy;

        self
    }

    /// Set [Config::server_threads] and [Config::server_max_pending]
    pub fn server_pool(&mut self, threads: usize, max_pending: usize) -> &mut Self {
        self.config.server_threads = threads;
        self.config.server_max_pending = max_pending;

        self
    }

    /// Advertise a named endpoint (scheme to port) along with this node.
    pub fn endpoint(&mut self, scheme: &str, port: u16) -> &mut Self {
        self.endpoints.push((scheme.to_string(), port));

        self
    }

    /// Receive every [Observer] event, for example with [crate::Statistics].
    pub fn observer(&mut self, observer: Arc<dyn Observer>) -> &mut Self {
        self.observer = Some(observer);

        self
    }

    /// Replace the whole [Config].
    pub fn config(&mut self, config: Config) -> &mut Self {
        self.config = config;

        self
    }

    /// Create a node reachable at `address` through `transport`.
    pub fn build(&self, address: SocketAddr, transport: Arc<dyn Transport>) -> Result<Dht> {
        let key = match &self.key {
            Some(key) => key.clone(),
            None => KeyFactory::new(self.config.key_length).random(),
        };

        let local = self
            .endpoints
            .iter()
            .fold(Node::new(key, address), |node, (scheme, port)| {
                node.with_endpoint(scheme, *port)
            });

        let observer = self
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));

        Ok(Dht(Rpc::new(
            local,
            self.config.clone(),
            transport,
            observer,
        )?))
    }
}
