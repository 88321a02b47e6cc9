//! Key space primitives shared by the routing table, caches and rpc layers.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod closest_nodes;
mod key;
mod messages;
mod node;

pub use closest_nodes::{ClosestNodes, Proximity};
pub use key::{Key, KeyFactory, DEFAULT_KEY_LENGTH};
pub use messages::{
    Content, FindNodeRequest, FindNodeResponse, Message, MessageKind, MessageType,
};
pub use node::Node;

/// Lock a mutex, recovering the guard if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
