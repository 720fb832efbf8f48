//! Relay state shared by the dispatcher and the router
//!
//! Owned by the server's poll loop and lent to handlers by `&mut`, so there
//! is exactly one writer and no locking.

use crate::registry::ConnectionRegistry;
use crate::room::Room;

/// Registry and room, owned together
#[derive(Debug, Default)]
pub struct RelayContext {
    pub registry: ConnectionRegistry,
    pub room: Room,
}

impl RelayContext {
    pub fn new() -> Self {
        Self::default()
    }
}
