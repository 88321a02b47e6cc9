//! Request/response plumbing and the operations built on it.

pub mod config;
pub(crate) mod dispatcher;
mod filter;
mod find_node;
mod handlers;
mod join;
mod ping;
mod response;
mod timer;
mod worker_pool;

use std::{
    fmt::{self, Debug, Formatter},
    net::SocketAddr,
    sync::{Arc, Weak},
};

use tracing::{debug, info};

use crate::{
    cache::{CacheOptions, ResultCache},
    common::{Key, Message, MessageKind, Node},
    routing_table::RoutingTable,
    statistics::Observer,
    Error, Result,
};

pub use config::Config;
pub use dispatcher::{Callback, Dispatcher, Registration, Request, Transport};
pub use filter::MessageFilter;
pub use find_node::{FindNodeOperation, LookupResult, LookupStrategy};
pub use join::JoinOperation;
pub use ping::Pinger;
pub use response::ResponseFuture;
pub use timer::{Timer, TimerHandle};
pub use worker_pool::WorkerPool;

/// Everything a node is made of: routing table, dispatcher, cache and the pools
/// answering incoming requests and probing contacts.
pub struct Rpc {
    local: Node,
    config: Config,
    routing_table: Arc<RoutingTable>,
    dispatcher: Dispatcher,
    cache: Box<dyn ResultCache>,
    observer: Arc<dyn Observer>,
    pinger: Pinger,
    server_pool: WorkerPool,
    registrations: Vec<Registration>,
}

impl Debug for Rpc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpc")
            .field("local", &self.local)
            .field("routing_table", &self.routing_table)
            .field("dispatcher", &self.dispatcher)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Rpc {
    /// Create a node sending through `transport`.
    ///
    /// The transport must hand every incoming message to [Self::handle_incoming].
    pub fn new(
        local: Node,
        config: Config,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn Observer>,
    ) -> Result<Arc<Self>> {
        if local.key().len() != config.key_length {
            return Err(Error::InvalidKeyLength {
                expected: config.key_length,
                found: local.key().len(),
            });
        }

        let dispatcher = Dispatcher::new(transport, config.concurrency, config.request_timeout)?;

        let pinger = Pinger::new(
            local.clone(),
            dispatcher.clone(),
            Arc::new(WorkerPool::new(
                "kadnet-ping",
                config.ping_threads,
                config.ping_max_pending,
            )?),
            config.request_timeout,
            observer.clone(),
        );
        let server_pool = WorkerPool::new(
            "kadnet-server",
            config.server_threads,
            config.server_max_pending,
        )?;

        let routing_table = Arc::new(RoutingTable::new(
            local.clone(),
            config.bucket_size,
            config.nr_colors,
            |_| {
                config.bucket_policy.build(
                    config.bucket_size,
                    config.bucket_valid_timespan,
                    &pinger,
                )
            },
        ));

        let cache = CacheOptions {
            policy: config.cache_policy,
            size: config.cache_size,
            valid_time: config.cache_valid_time,
            bucket_size: config.bucket_size,
            nr_colors: config.color_gated_cache.then_some(config.nr_colors),
        }
        .build(local.key());

        let table_handler = routing_table.register_incoming_message_handler(&dispatcher);

        info!(?local, "Starting node");

        Ok(Arc::new_cyclic(|rpc: &Weak<Rpc>| {
            let request_handler = handlers::register(rpc.clone(), &dispatcher, local.key());

            Rpc {
                local,
                config,
                routing_table,
                dispatcher,
                cache,
                observer,
                pinger,
                server_pool,
                registrations: vec![table_handler, request_handler],
            }
        }))
    }

    // === Getters ===

    pub fn local(&self) -> &Node {
        &self.local
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routing_table(&self) -> &Arc<RoutingTable> {
        &self.routing_table
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &dyn ResultCache {
        self.cache.as_ref()
    }

    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    // === Public Methods ===

    /// Entry point for the transport: dispatch an incoming message on the server pool.
    ///
    /// Messages are dropped while the pool is saturated.
    pub fn handle_incoming(&self, message: Message) {
        self.observer.incoming_message(&message);

        let dispatcher = self.dispatcher.clone();
        let from = message.src.address();

        if let Err(error) = self.server_pool.execute(move || dispatcher.dispatch(&message)) {
            debug!(?from, ?error, "Dropping incoming message");
        }
    }

    /// A new outgoing message from this node with a fresh id.
    pub fn message(&self, kind: MessageKind) -> Message {
        Message::new(self.dispatcher.next_message_id(), self.local.clone(), kind)
    }

    /// The closest nodes to `key`, see [FindNodeOperation].
    pub fn find_node(&self, key: &Key) -> Result<LookupResult> {
        FindNodeOperation::new(self, key.clone()).run()
    }

    /// Like [Self::find_node] with extra contacts to start from.
    pub fn find_node_with_bootstrap(&self, key: &Key, bootstrap: &[Node]) -> Result<LookupResult> {
        FindNodeOperation::new(self, key.clone())
            .with_bootstrap(bootstrap)
            .run()
    }

    /// Join the network, see [JoinOperation].
    pub fn join(&self, bootstrap: &[SocketAddr]) -> Result<()> {
        JoinOperation::new(self, bootstrap).run()
    }

    /// Ping `node` and block until it answers.
    pub fn ping(&self, node: &Node) -> Result<Message> {
        self.pinger.ping(node)
    }

    /// Stop answering requests and fail every pending one with [Error::Shutdown].
    pub fn shutdown(&self) {
        for registration in &self.registrations {
            registration.cancel();
        }

        self.dispatcher.shutdown();
    }
}

impl Drop for Rpc {
    fn drop(&mut self) {
        self.shutdown();
    }
}
