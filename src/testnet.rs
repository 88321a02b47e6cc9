//! In-memory network for tests and demos.

use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU16, Ordering},
        Arc, Mutex,
    },
    thread,
};

use flume::Sender;
use tracing::trace;

use crate::{
    common::{lock, Message, Node},
    dht::{Dht, DhtBuilder},
    rpc::Transport,
    Result,
};

struct Peer {
    inbox: Sender<Message>,
    online: Arc<AtomicBool>,
}

#[derive(Clone, Default)]
/// A [Transport] delivering messages between nodes of the same process.
///
/// Sending to an unknown address fails, sending to an offline node is silently lost.
pub struct MemoryNetwork {
    peers: Arc<Mutex<HashMap<SocketAddr, Peer>>>,
    next_port: Arc<AtomicU16>,
}

impl Debug for MemoryNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("peers", &self.len())
            .finish()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    // === Getters ===

    /// Number of nodes attached to this network.
    pub fn len(&self) -> usize {
        lock(&self.peers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // === Public Methods ===

    /// Build a node at a fresh address and deliver its messages on a dedicated thread.
    pub fn spawn(&self, builder: &DhtBuilder) -> Result<Dht> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed) + 1;
        let address = SocketAddr::from(([127, 0, 0, 1], port));

        let (inbox, receiver) = flume::unbounded::<Message>();

        let dht = builder.build(address, Arc::new(self.clone()))?;
        let rpc = Arc::downgrade(&dht.0);

        thread::Builder::new()
            .name(format!("kadnet-memory-{port}"))
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match rpc.upgrade() {
                        Some(rpc) => rpc.handle_incoming(message),
                        None => break,
                    }
                }
            })?;

        lock(&self.peers).insert(
            address,
            Peer {
                inbox,
                online: Arc::new(AtomicBool::new(true)),
            },
        );

        Ok(dht)
    }

    /// Take a node off the network, or bring it back. Messages to an offline node are lost.
    pub fn set_online(&self, address: SocketAddr, online: bool) {
        if let Some(peer) = lock(&self.peers).get(&address) {
            peer.online.store(online, Ordering::Release);
        }
    }

    /// Detach a node, sending to its address fails from now on.
    pub fn remove(&self, address: SocketAddr) {
        lock(&self.peers).remove(&address);
    }
}

impl Transport for MemoryNetwork {
    fn send(&self, to: &Node, message: Message) -> io::Result<()> {
        let peers = lock(&self.peers);

        let Some(peer) = peers.get(&to.address()) else {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no node at {}", to.address()),
            ));
        };

        if !peer.online.load(Ordering::Acquire) {
            trace!(to = ?to.address(), "Dropping message to offline node");
            return Ok(());
        }

        peer.inbox
            .send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "node stopped"))
    }
}

#[derive(Debug)]
/// Create a testnet of Dht nodes over a [MemoryNetwork] to run tests against.
pub struct Testnet {
    /// Address of the first node, every node can be reached from it.
    pub bootstrap: Vec<SocketAddr>,
    pub nodes: Vec<Dht>,
    network: MemoryNetwork,
}

impl Testnet {
    /// Create `count` nodes with the default configuration.
    pub fn new(count: usize) -> Result<Testnet> {
        Self::with_builder(count, |_| Dht::builder())
    }

    /// Create `count` nodes, configuring node `i` with `make_builder(i)`.
    ///
    /// Every node joins through the one created before it.
    pub fn with_builder<F>(count: usize, mut make_builder: F) -> Result<Testnet>
    where
        F: FnMut(usize) -> DhtBuilder,
    {
        let network = MemoryNetwork::new();
        let mut nodes: Vec<Dht> = Vec::with_capacity(count);

        for i in 0..count {
            let node = network.spawn(&make_builder(i))?;

            if let Some(previous) = nodes.last() {
                node.join(&[previous.local().address()])?;
            }

            nodes.push(node);
        }

        let bootstrap = nodes
            .first()
            .map(|node| vec![node.local().address()])
            .unwrap_or_default();

        Ok(Testnet {
            bootstrap,
            nodes,
            network,
        })
    }

    // === Getters ===

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}
