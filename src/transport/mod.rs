//! Transport abstraction
//!
//! The relay core only ever talks to a `Transport`: it drains events with
//! `poll` once per tick and pushes packets out with `send`. Transports that
//! do I/O on other threads or tasks must queue their events and hand them
//! over from `poll`, so that the registry and room are only touched by the
//! thread running the poll loop.

use std::net::SocketAddr;

use crate::error::TransportError;
use crate::types::{ConnectionHandle, Delivery};

pub mod memory;
pub mod websocket;

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// Where and how to accept connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub bind_address: String,
    pub port: u16,
    /// Shared key every client must present, if set
    pub connection_key: Option<String>,
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed without a message
    ClosedByPeer,
    /// Peer closed and said why
    ClosedWithMessage(String),
    /// Socket-level failure
    TransportFailure(String),
    /// The server disconnected everyone
    Shutdown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ClosedByPeer => write!(f, "closed by peer"),
            DisconnectReason::ClosedWithMessage(msg) => write!(f, "closed by peer ({})", msg),
            DisconnectReason::TransportFailure(err) => write!(f, "transport failure: {}", err),
            DisconnectReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Something that happened on the transport since the last poll
#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        handle: ConnectionHandle,
    },
    Disconnected {
        handle: ConnectionHandle,
        reason: DisconnectReason,
    },
    PacketReceived {
        handle: ConnectionHandle,
        payload: Vec<u8>,
        delivery: Delivery,
    },
    Error {
        handle: Option<ConnectionHandle>,
        error: TransportError,
    },
}

/// A packet transport the relay can run on
pub trait Transport {
    /// Start accepting connections; returns the bound address
    fn listen(&mut self, config: &ListenConfig) -> Result<SocketAddr, TransportError>;

    /// Take every event queued since the last call, in arrival order
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Queue a packet for one connection
    fn send(
        &mut self,
        handle: ConnectionHandle,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError>;

    /// Close every open connection
    fn disconnect_all(&mut self);

    /// Stop accepting connections and release the listener
    fn shutdown(&mut self);
}
