//! Struct and implementation of the Node entry in the Kademlia routing table
use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    net::SocketAddr,
};

use serde::{Deserialize, Serialize};

use crate::common::Key;

#[derive(Clone, Serialize, Deserialize)]
/// A contact in the network: a [Key], a network address and optional named endpoints.
///
/// Equality and hashing only consider the key, two contacts with the same key are
/// the same logical peer wherever they are reachable.
pub struct Node {
    key: Key,
    address: SocketAddr,
    endpoints: BTreeMap<String, u16>,
}

impl Node {
    pub fn new(key: Key, address: SocketAddr) -> Node {
        Node {
            key,
            address,
            endpoints: BTreeMap::new(),
        }
    }

    /// Add a named endpoint (scheme to port) for another transport.
    pub fn with_endpoint(mut self, scheme: &str, port: u16) -> Self {
        self.endpoints.insert(scheme.to_string(), port);
        self
    }

    // === Getters ===

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// All named endpoints of this contact.
    pub fn endpoints(&self) -> &BTreeMap<String, u16> {
        &self.endpoints
    }

    /// Socket address for a named endpoint, on the same IP as [Self::address].
    pub fn endpoint(&self, scheme: &str) -> Option<SocketAddr> {
        self.endpoints
            .get(scheme)
            .map(|port| SocketAddr::new(self.address.ip(), *port))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &format_args!("{}", self.key))
            .field("address", &self.address)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use crate::common::KeyFactory;

    use super::*;

    #[test]
    fn equality_by_key_only() {
        let key = KeyFactory::default().random();

        let a = Node::new(key.clone(), ([127, 0, 0, 1], 4000).into());
        let b = Node::new(key, ([10, 0, 0, 1], 5000).into()).with_endpoint("http", 8080);

        assert_eq!(a, b);

        let set: HashSet<Node> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn endpoints() {
        let node = Node::new(KeyFactory::default().random(), ([10, 0, 0, 1], 5000).into())
            .with_endpoint("http", 8080);

        assert_eq!(node.endpoint("http"), Some(([10, 0, 0, 1], 8080).into()));
        assert_eq!(node.endpoint("udp"), None);
    }
}
