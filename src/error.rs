//! Error types for the relay server
//!
//! Defines codec, relay-state, transport, and configuration errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ConnectionHandle;

/// Packet decoding errors
///
/// Always a protocol violation by the peer: the packet is dropped,
/// the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Fewer bytes remain than the field needs
    #[error("packet truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A length or count field was negative
    #[error("negative length field: {0}")]
    NegativeLength(i32),

    /// A string field did not hold valid UTF-8
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A string or count is too large to encode
    #[error("field too large to encode: {0} bytes")]
    TooLarge(usize),
}

/// Relay state errors
///
/// Covers client-state conflicts (answered with `InvalidRequest`) and
/// internal invariant violations (logged, never sent to clients).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Client tried to set their name a second time
    #[error("Client already has name")]
    NameAlreadySet,

    /// Client tried to join while already a room member
    #[error("Client already in room")]
    AlreadyMember,

    /// A transport handle has no registered session
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionHandle),

    /// A transport reported a connect for an already registered handle
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionHandle),

    /// Command body could not be decoded
    #[error("malformed command: {0}")]
    Codec(#[from] CodecError),
}

impl RelayError {
    /// Whether this error should be reported back to the client
    pub fn is_client_conflict(&self) -> bool {
        matches!(self, RelayError::NameAlreadySet | RelayError::AlreadyMember)
    }
}

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No live connection for the handle
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionHandle),

    /// The connection's outbound queue is full
    #[error("outbound queue full for connection {0}")]
    QueueFull(ConnectionHandle),

    /// The transport is not listening (or already shut down)
    #[error("transport closed")]
    Closed,

    /// `listen` was called twice
    #[error("transport is already listening")]
    AlreadyListening,

    /// `listen` was called outside a tokio runtime
    #[error("no tokio runtime available")]
    NoRuntime,

    /// The client did not present the configured connection key
    #[error("connection key rejected for {0}")]
    KeyRejected(std::net::SocketAddr),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Wrong number of arguments
    #[error("expected 0, 2 or 3 arguments, got {0}")]
    ArgumentCount(usize),

    /// Port argument did not parse
    #[error("Invalid Port: {0}")]
    InvalidPort(String),
}
