#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;
mod dht;
mod error;
mod testnet;

#[cfg(feature = "async")]
pub mod async_dht;
pub mod cache;
pub mod routing_table;
pub mod rpc;
pub mod statistics;

pub use crate::common::{
    ClosestNodes, Content, FindNodeRequest, FindNodeResponse, Key, KeyFactory, Message,
    MessageKind, MessageType, Node, Proximity, DEFAULT_KEY_LENGTH,
};
pub use bytes::Bytes;
pub use dht::{Dht, DhtBuilder};
pub use error::{Error, Result};
pub use rpc::{LookupResult, LookupStrategy};
pub use statistics::{Observer, Statistics};
pub use testnet::{MemoryNetwork, Testnet};
