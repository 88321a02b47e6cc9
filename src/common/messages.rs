//! Messages exchanged between nodes.
//!
//! Encoding is left to the [crate::rpc::Transport], these are the decoded forms.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Key, Node};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id, a response carries the id of its request.
    pub id: u64,
    /// The sender.
    pub src: Node,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageKind {
    Ping,
    Pong,
    FindNode(FindNodeRequest),
    FindNodeResponse(FindNodeResponse),
    ContentRequest(Content),
    ContentResponse(Content),
    /// One way content, no response expected.
    ContentMessage(Content),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindNodeRequest {
    pub key: Key,
    /// Ask the responder to answer from its result cache if it can.
    pub search_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindNodeResponse {
    pub nodes: Vec<Node>,
    /// `true` if `nodes` is an authoritative result from the responder's cache.
    pub cached_results: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Application payload addressed by a tag.
pub struct Content {
    pub tag: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Discriminant of [MessageKind], used for filtering.
pub enum MessageType {
    Ping,
    Pong,
    FindNode,
    FindNodeResponse,
    ContentRequest,
    ContentResponse,
    ContentMessage,
}

impl MessageType {
    /// The message type that answers a request of this type.
    pub fn response_type(self) -> Option<MessageType> {
        match self {
            MessageType::Ping => Some(MessageType::Pong),
            MessageType::FindNode => Some(MessageType::FindNodeResponse),
            MessageType::ContentRequest => Some(MessageType::ContentResponse),
            _ => None,
        }
    }
}

impl MessageKind {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageKind::Ping => MessageType::Ping,
            MessageKind::Pong => MessageType::Pong,
            MessageKind::FindNode(_) => MessageType::FindNode,
            MessageKind::FindNodeResponse(_) => MessageType::FindNodeResponse,
            MessageKind::ContentRequest(_) => MessageType::ContentRequest,
            MessageKind::ContentResponse(_) => MessageType::ContentResponse,
            MessageKind::ContentMessage(_) => MessageType::ContentMessage,
        }
    }

    /// Tag of content messages.
    pub fn tag(&self) -> Option<&str> {
        match self {
            MessageKind::ContentRequest(content)
            | MessageKind::ContentResponse(content)
            | MessageKind::ContentMessage(content) => Some(&content.tag),
            _ => None,
        }
    }
}

impl Message {
    pub fn new(id: u64, src: Node, kind: MessageKind) -> Self {
        Self { id, src, kind }
    }

    pub fn message_type(&self) -> MessageType {
        self.kind.message_type()
    }

    /// A response to this message from `src`, carrying the same id.
    pub fn reply(&self, src: Node, kind: MessageKind) -> Message {
        Message {
            id: self.id,
            src,
            kind,
        }
    }
}
