use std::time::Duration;

use crate::{
    cache::{CachePolicy, DEFAULT_CACHE_SIZE},
    common::DEFAULT_KEY_LENGTH,
    routing_table::{BucketPolicy, DEFAULT_BUCKET_SIZE},
};

use super::find_node::LookupStrategy;

/// Default number of colors keys are partitioned into.
pub const DEFAULT_NR_COLORS: u32 = 10;
/// Default number of requests a single lookup keeps in flight.
pub const DEFAULT_ALPHA: usize = 3;
/// Default number of outstanding requests of a whole node.
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
/// Default time a bucket trusts a contact's last response.
pub const DEFAULT_BUCKET_VALID_TIMESPAN: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
/// Node configurations
pub struct Config {
    /// Length of every key in bytes.
    ///
    /// Defaults to [DEFAULT_KEY_LENGTH]
    pub key_length: usize,
    /// K, the maximum number of contacts per bucket and the size of lookup results.
    ///
    /// Defaults to [DEFAULT_BUCKET_SIZE]
    pub bucket_size: usize,
    /// Number of colors for color proximity and the color gated cache.
    ///
    /// Defaults to [DEFAULT_NR_COLORS]
    pub nr_colors: u32,
    /// Number of requests a lookup keeps in flight.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// Number of outstanding requests shared by every operation of a node.
    ///
    /// Defaults to [DEFAULT_CONCURRENCY]
    pub concurrency: usize,
    /// Time to wait for a response.
    ///
    /// The longer this duration is, the longer lookups take when contacts are gone.
    /// The shorter it is, the more responses from busy nodes we miss out on.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// How buckets admit and evict contacts.
    ///
    /// Defaults to [BucketPolicy::Stable]
    pub bucket_policy: BucketPolicy,
    /// Contacts that responded within this span are not probed before eviction decisions.
    ///
    /// Defaults to [DEFAULT_BUCKET_VALID_TIMESPAN]
    pub bucket_valid_timespan: Duration,
    /// Which result cache to use.
    ///
    /// Defaults to [CachePolicy::Lru]
    pub cache_policy: CachePolicy,
    /// Maximum number of cached lookups.
    ///
    /// Defaults to [DEFAULT_CACHE_SIZE]
    pub cache_size: usize,
    /// Entry lifetime of the [CachePolicy::Ttl] cache.
    ///
    /// Defaults to 10 hours.
    pub cache_valid_time: Duration,
    /// Once the cache is full, only cache keys of our own color.
    ///
    /// Defaults to false
    pub color_gated_cache: bool,
    /// How lookups use caches.
    ///
    /// Defaults to [LookupStrategy::Kademlia]
    pub lookup_strategy: LookupStrategy,
    /// Threads handling incoming messages.
    ///
    /// Defaults to 8
    pub server_threads: usize,
    /// Incoming messages waiting for a server thread before new ones are dropped.
    ///
    /// Defaults to 128
    pub server_max_pending: usize,
    /// Threads sending bucket liveness probes.
    ///
    /// Defaults to 1
    pub ping_threads: usize,
    /// Probes waiting for a ping thread before new ones are rejected.
    ///
    /// Defaults to 16
    pub ping_max_pending: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            bucket_size: DEFAULT_BUCKET_SIZE,
            nr_colors: DEFAULT_NR_COLORS,
            alpha: DEFAULT_ALPHA,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            bucket_policy: BucketPolicy::default(),
            bucket_valid_timespan: DEFAULT_BUCKET_VALID_TIMESPAN,
            cache_policy: CachePolicy::default(),
            cache_size: DEFAULT_CACHE_SIZE,
            cache_valid_time: crate::cache::DEFAULT_VALID_TIME,
            color_gated_cache: false,
            lookup_strategy: LookupStrategy::default(),
            server_threads: 8,
            server_max_pending: 128,
            ping_threads: 1,
            ping_max_pending: 16,
        }
    }
}
