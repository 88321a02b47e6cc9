//! Entering the network through known addresses.

use std::net::SocketAddr;

use tracing::{debug, info};

use crate::{
    common::{KeyFactory, MessageKind, Node},
    routing_table::TrackedNode,
    Error, Result,
};

use super::Rpc;

/// Ping every bootstrap address, then look up our own key and a random key of every
/// bucket to fill the routing table.
pub struct JoinOperation<'a> {
    rpc: &'a Rpc,
    bootstrap: Vec<SocketAddr>,
}

impl<'a> JoinOperation<'a> {
    pub fn new(rpc: &'a Rpc, bootstrap: &[SocketAddr]) -> Self {
        Self {
            rpc,
            bootstrap: bootstrap.to_vec(),
        }
    }

    /// Fails with [Error::BootstrapFailed] if no bootstrap address answered.
    pub fn run(self) -> Result<()> {
        let rpc = self.rpc;
        let placeholder = KeyFactory::new(rpc.local().key().len()).zero();

        let pings: Vec<_> = self
            .bootstrap
            .iter()
            .filter_map(|address| {
                // Key is unknown until the pong arrives.
                let node = Node::new(placeholder.clone(), *address);

                rpc.observer().ping_sent();

                match rpc
                    .dispatcher()
                    .request()
                    .future_send(&node, rpc.message(MessageKind::Ping))
                {
                    Ok(future) => Some((*address, future)),
                    Err(error) => {
                        debug!(?address, ?error, "Failed to ping bootstrap node");
                        None
                    }
                }
            })
            .collect();

        for (address, future) in pings {
            match future.get() {
                Ok(pong) => rpc
                    .routing_table()
                    .insert(TrackedNode::contacted(pong.src)),
                Err(error) => debug!(?address, %error, "Bootstrap node did not answer"),
            }
        }

        if rpc.routing_table().is_empty() {
            return Err(Error::BootstrapFailed);
        }

        rpc.find_node(rpc.local().key())?;

        for key in rpc.routing_table().random_keys_for_all_buckets() {
            rpc.find_node(&key)?;
        }

        info!(
            local = ?rpc.local(),
            contacts = rpc.routing_table().size(),
            "Joined the network"
        );

        Ok(())
    }
}
