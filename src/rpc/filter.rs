//! Predicates selecting which incoming messages a registration receives.

use crate::common::{Key, Message, MessageType};

#[derive(Debug, Clone, PartialEq)]
/// A registration receives a message only if every one of its filters accepts it.
pub enum MessageFilter {
    /// Accept messages with this correlation id.
    Id(u64),
    /// Accept messages of this type.
    Type(MessageType),
    /// Accept content messages carrying this tag.
    Tag(String),
    /// Reject messages sent by this key.
    SrcExcluder(Key),
    /// Reject messages of this type.
    TypeExcluder(MessageType),
}

impl MessageFilter {
    pub fn accepts(&self, message: &Message) -> bool {
        match self {
            MessageFilter::Id(id) => message.id == *id,
            MessageFilter::Type(kind) => message.message_type() == *kind,
            MessageFilter::Tag(tag) => message.kind.tag() == Some(tag.as_str()),
            MessageFilter::SrcExcluder(key) => message.src.key() != key,
            MessageFilter::TypeExcluder(kind) => message.message_type() != *kind,
        }
    }
}
