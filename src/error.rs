//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Kadnet crate error enum.
pub enum Error {
    /// Two keys (or a key and the configured key length) disagree in size.
    #[error("Invalid key length: expected {expected} bytes, found {found}")]
    InvalidKeyLength {
        /// Length required by the key space.
        expected: usize,
        /// Length that was actually provided.
        found: usize,
    },

    /// A key could not be parsed, for example from malformed hex.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    /// The [crate::rpc::Transport] failed to send a message.
    Transport(#[from] std::io::Error),

    /// No matching response arrived before the request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The request or registration was explicitly cancelled.
    #[error("Request was cancelled")]
    Cancelled,

    /// A bounded resource (outstanding requests or a worker queue) is full.
    #[error("Capacity exceeded")]
    CapacityExceeded,

    /// None of the bootstrap contacts answered, so the routing table is still empty.
    #[error("Failed to join the network: no bootstrap contact answered")]
    BootstrapFailed,

    /// The node was shutdown and no longer accepts work.
    #[error("Node was shutdown")]
    Shutdown,
}

/// Alias for `Result<T, kadnet::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
