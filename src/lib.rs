//! Single-Room Packet Relay Server Library
//!
//! Clients connect, receive a session identity, join one shared room and
//! then exchange opaque payloads: the server rebroadcasts every packet a
//! member sends to all other members. A small command protocol (name,
//! join, identity, roster, error) shares the same channel, marked by a
//! leading `-1` (`i16`).
//!
//! # Features
//! - Binary command codec (`packet`, `message`)
//! - Connection registry and ordered room membership
//! - Command dispatch with `InvalidRequest` responses for client mistakes
//! - Byte-exact relay to every other member, keeping the delivery class
//! - WebSocket transport with optional connection key
//! - In-process transport for tests and embedding
//!
//! # Architecture
//! A single poll loop (`RelayServer`) owns all state:
//! - Every tick drains the transport's events and handles them in order
//! - Transport I/O runs in tokio tasks that only queue events
//! - No locks needed - the registry and room have a single writer
//!
//! # Example
//! ```ignore
//! use relay_server::{RelayServer, ServerConfig, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let mut server = RelayServer::new(WebSocketTransport::new(), config.poll_interval);
//!     server.listen(&config.listen_config()).unwrap();
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod packet;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use context::RelayContext;
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use error::{CodecError, ConfigError, RelayError, TransportError};
pub use message::{ClientCommand, ClientTag, MemberEntry, ServerCommand, ServerTag};
pub use packet::{Packet, COMMAND_MARKER};
pub use registry::ConnectionRegistry;
pub use room::Room;
pub use router::{route_packet, DropReason, RouteOutcome};
pub use server::RelayServer;
pub use session::Session;
pub use transport::{
    DisconnectReason, ListenConfig, MemoryTransport, Transport, TransportEvent, WebSocketTransport,
};
pub use types::{ConnectionHandle, Delivery, SessionId};
