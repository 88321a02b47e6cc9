//! Iterative parallel search for the nodes closest to a key.

use std::collections::HashSet;

use flume::Sender;
use tracing::{debug, trace};

use crate::{
    common::{ClosestNodes, FindNodeRequest, FindNodeResponse, Key, Message, MessageKind, Node},
    Error, Result,
};

use super::Rpc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// How lookups use result caches.
pub enum LookupStrategy {
    #[default]
    /// Plain Kademlia: never answer from the local cache, never ask remote caches.
    Kademlia,
    /// Answer from a complete local cache entry if there is one,
    /// and ask queried nodes to answer from theirs.
    LocalCache,
}

#[derive(Debug, Clone)]
/// Outcome of a [FindNodeOperation].
pub struct LookupResult {
    nodes: Vec<Node>,
    queried: usize,
    peak_in_flight: usize,
    cached_by: Option<Node>,
    from_local_cache: bool,
}

impl LookupResult {
    // === Getters ===

    /// Closest nodes to the target, closest first. Includes the local node if it is among them.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes queried, a hop count estimate.
    pub fn queried(&self) -> usize {
        self.queried
    }

    /// Largest number of requests this lookup had in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    /// The node that answered from its cache and ended the lookup, if any.
    pub fn cached_by(&self) -> Option<&Node> {
        self.cached_by.as_ref()
    }

    /// Returns `true` if the local cache answered without any network activity.
    pub fn from_local_cache(&self) -> bool {
        self.from_local_cache
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

enum Event {
    Reply(Node, FindNodeResponse),
    Failed(Node, Error),
}

/// The canonical Kademlia lookup: keep up to `alpha` find node requests in flight to the
/// closest unqueried candidates, merging every reply, until no candidate is left to query.
pub struct FindNodeOperation<'a> {
    rpc: &'a Rpc,
    target: Key,
    bootstrap: Vec<Node>,
}

impl<'a> FindNodeOperation<'a> {
    pub fn new(rpc: &'a Rpc, target: Key) -> Self {
        Self {
            rpc,
            target,
            bootstrap: Vec::new(),
        }
    }

    /// Extra contacts to seed the candidates with.
    pub fn with_bootstrap(mut self, bootstrap: &[Node]) -> Self {
        self.bootstrap.extend_from_slice(bootstrap);
        self
    }

    /// Block until the lookup terminates.
    ///
    /// Never fails because of the network, unreachable nodes only make the result smaller.
    pub fn run(self) -> Result<LookupResult> {
        let local = self.rpc.local();

        if self.target.len() != local.key().len() {
            return Err(Error::InvalidKeyLength {
                expected: local.key().len(),
                found: self.target.len(),
            });
        }

        let config = self.rpc.config();
        let k = config.bucket_size;
        let alpha = config.alpha.max(1);
        let search_cache = config.lookup_strategy == LookupStrategy::LocalCache;

        if search_cache {
            if let Some(nodes) = self.rpc.cache().search(&self.target) {
                if nodes.len() == k {
                    trace!(target = ?self.target, "Lookup answered by local cache");

                    self.rpc.observer().local_cache_hit();
                    self.rpc.observer().lookup_completed(0);

                    return Ok(LookupResult {
                        nodes,
                        queried: 0,
                        peak_in_flight: 0,
                        cached_by: None,
                        from_local_cache: true,
                    });
                }
            }
        }

        let mut candidates = ClosestNodes::new(self.target.clone());
        candidates.extend(self.rpc.routing_table().closest_nodes_by_key(&self.target, k));
        candidates.extend(self.bootstrap.iter().cloned());
        candidates.add(local.clone());
        candidates.truncate(k);

        let mut queried = HashSet::from([local.key().clone()]);
        let mut in_flight: HashSet<Key> = HashSet::new();
        let mut failed: HashSet<Key> = HashSet::new();
        let mut peak_in_flight = 0;
        let mut cached_by = None;

        let (events, monitor) = flume::unbounded();

        loop {
            while in_flight.len() < alpha {
                let Some(node) = candidates
                    .iter()
                    .find(|node| {
                        !queried.contains(node.key()) && !in_flight.contains(node.key())
                    })
                    .cloned()
                else {
                    break;
                };

                in_flight.insert(node.key().clone());

                let sent = match self.request(&node, &events, search_cache, false) {
                    Ok(false) if in_flight.len() == 1 => {
                        self.request(&node, &events, search_cache, true)
                    }
                    sent => sent,
                };

                match sent {
                    Ok(true) => {
                        peak_in_flight = peak_in_flight.max(in_flight.len());
                    }
                    Ok(false) => {
                        // Pool is full, wait for one of ours to complete.
                        in_flight.remove(node.key());
                        break;
                    }
                    // The failure is delivered as an event.
                    Err(Error::Transport(_)) => {}
                    Err(error) => {
                        debug!(?node, ?error, "Could not send find node request");

                        in_flight.remove(node.key());
                        queried.insert(node.key().clone());
                        failed.insert(node.key().clone());
                        candidates.remove(node.key());
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let Ok(event) = monitor.recv() else {
                break;
            };

            match event {
                Event::Reply(node, response) => {
                    in_flight.remove(node.key());
                    queried.insert(node.key().clone());

                    for contact in response.nodes {
                        if !failed.contains(contact.key()) {
                            candidates.add(contact);
                        }
                    }
                    candidates.truncate(k);

                    if response.cached_results {
                        trace!(target = ?self.target, ?node, "Lookup answered by a remote cache");

                        self.rpc.observer().remote_cache_hit();
                        cached_by = Some(node);
                        break;
                    }
                }
                Event::Failed(node, error) => {
                    trace!(?node, %error, "Find node request failed");

                    in_flight.remove(node.key());
                    queried.insert(node.key().clone());
                    failed.insert(node.key().clone());
                    candidates.remove(node.key());

                    self.rpc.routing_table().mark_dead(&node);
                }
            }
        }

        let queried = (queried.len() + in_flight.len()).saturating_sub(1);
        let nodes = candidates.into_vec();

        debug!(target = ?self.target, found = nodes.len(), queried, "Lookup done");

        self.rpc.cache().insert(self.target.clone(), nodes.clone());
        self.rpc.observer().lookup_completed(queried);

        Ok(LookupResult {
            nodes,
            queried,
            peak_in_flight,
            cached_by,
            from_local_cache: false,
        })
    }

    /// Send a find node request to `node`, reporting its outcome on `events`.
    ///
    /// Returns `Ok(false)` if not blocking and the outstanding request pool is full.
    fn request(
        &self,
        node: &Node,
        events: &Sender<Event>,
        search_cache: bool,
        blocking: bool,
    ) -> Result<bool> {
        let message = self.rpc.message(MessageKind::FindNode(FindNodeRequest {
            key: self.target.clone(),
            search_cache,
        }));

        let events = events.clone();
        let to = node.clone();

        let request = self.rpc.dispatcher().request().callback(move |result| {
            let event = match result {
                Ok(Message {
                    kind: MessageKind::FindNodeResponse(response),
                    ..
                }) => Event::Reply(to.clone(), response),
                // Unreachable behind the response type filter.
                Ok(_) => Event::Failed(to.clone(), Error::Cancelled),
                Err(error) => Event::Failed(to.clone(), error),
            };

            let _ = events.send(event);
        });

        if blocking {
            request.send(node, message).map(|_| true)
        } else {
            request.try_send(node, message)
        }
    }
}
