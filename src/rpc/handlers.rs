//! Request handlers

use std::sync::Weak;

use tracing::{debug, trace};

use crate::common::{FindNodeRequest, FindNodeResponse, Key, Message, MessageKind};

use super::{Dispatcher, MessageFilter, Registration, Rpc};

/// Durable registration answering every request from another node.
pub(super) fn register(rpc: Weak<Rpc>, dispatcher: &Dispatcher, local: &Key) -> Registration {
    dispatcher
        .request()
        .consumable(false)
        .filter(MessageFilter::SrcExcluder(local.clone()))
        .callback(move |result| {
            if let (Some(rpc), Ok(message)) = (rpc.upgrade(), result) {
                handle_request(&rpc, &message);
            }
        })
        .register()
}

pub(super) fn handle_request(rpc: &Rpc, message: &Message) {
    let kind = match &message.kind {
        MessageKind::Ping => MessageKind::Pong,
        MessageKind::FindNode(request) => {
            MessageKind::FindNodeResponse(find_node_response(rpc, request))
        }
        _ => return,
    };

    let response = message.reply(rpc.local().clone(), kind);

    if let Err(error) = rpc.dispatcher().send_message(&message.src, response) {
        debug!(to = ?message.src.address(), ?error, "Failed to send response");
    }
}

fn find_node_response(rpc: &Rpc, request: &FindNodeRequest) -> FindNodeResponse {
    let FindNodeRequest { key, search_cache } = request;

    if key.len() != rpc.local().key().len() {
        trace!(?key, "Find node request for a key of the wrong length");

        return FindNodeResponse {
            nodes: Vec::new(),
            cached_results: false,
        };
    }

    if *search_cache {
        if let Some(nodes) = rpc.cache().search(key) {
            rpc.observer().find_node_cache_hit();

            return FindNodeResponse {
                nodes,
                cached_results: true,
            };
        }

        rpc.observer().find_node_cache_miss();
    }

    FindNodeResponse {
        nodes: rpc
            .routing_table()
            .closest_nodes_by_key(key, rpc.config().bucket_size),
        cached_results: false,
    }
}
