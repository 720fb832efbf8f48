//! Basic type definitions for the relay server
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique session identity
//! - `ConnectionHandle`: opaque transport-level connection handle
//! - `Delivery`: how a packet travelled (and how it should be forwarded)

use uuid::Uuid;

/// Unique session identity (newtype pattern)
///
/// Wraps a UUID v4. Sent to clients in its hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque connection handle issued by a transport
///
/// Only meaningful to the transport that issued it. Handles are never
/// reused within the lifetime of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delivery classification of a packet
///
/// Relayed packets are forwarded with the same classification they
/// arrived with. Command packets must always be `Reliable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delivery {
    /// Ordered and guaranteed
    #[default]
    Reliable,
    /// Best effort, may be dropped or reordered
    Unreliable,
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Reliable => write!(f, "reliable"),
            Delivery::Unreliable => write!(f, "unreliable"),
        }
    }
}
