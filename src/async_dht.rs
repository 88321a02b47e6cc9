//! AsyncDht node.

use std::{net::SocketAddr, thread};

use crate::{
    common::{Key, Message, MessageKind, Node},
    dht::Dht,
    rpc::LookupResult,
    Error, Result,
};

impl Dht {
    /// Return an async version of the Dht node.
    pub fn as_async(self) -> AsyncDht {
        AsyncDht(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the Dht node.
///
/// Lookups still block a thread, a dedicated one per call.
pub struct AsyncDht(Dht);

impl AsyncDht {
    // === Getters ===

    /// The blocking node behind this one.
    pub fn as_blocking(&self) -> &Dht {
        &self.0
    }

    // === Public Methods ===

    pub async fn find_node(&self, key: Key) -> Result<LookupResult> {
        let dht = self.0.clone();

        spawn_blocking(move || dht.find_node(&key)).await
    }

    pub async fn find_node_with_bootstrap(
        &self,
        key: Key,
        bootstrap: Vec<Node>,
    ) -> Result<LookupResult> {
        let dht = self.0.clone();

        spawn_blocking(move || dht.find_node_with_bootstrap(&key, &bootstrap)).await
    }

    pub async fn join(&self, bootstrap: Vec<SocketAddr>) -> Result<()> {
        let dht = self.0.clone();

        spawn_blocking(move || dht.join(&bootstrap)).await
    }

    /// Ping `node` without blocking a thread.
    pub async fn ping(&self, node: &Node) -> Result<Message> {
        let rpc = &self.0 .0;

        rpc.observer().ping_sent();

        rpc.dispatcher()
            .request()
            .future_send(node, rpc.message(MessageKind::Ping))?
            .get_async()
            .await
    }
}

async fn spawn_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, receiver) = flume::bounded(1);

    thread::Builder::new()
        .name("kadnet-lookup".to_string())
        .spawn(move || {
            let _ = sender.send(f());
        })?;

    receiver.recv_async().await.map_err(|_| Error::Shutdown)?
}
