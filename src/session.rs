//! Session struct definition
//!
//! Represents one connected client: identity, display name and the
//! transport handle it talks through.

use crate::room::Room;
use crate::types::{ConnectionHandle, SessionId};

/// Connected client information
///
/// The identity and handle are fixed for the session's lifetime; the name
/// can be set exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    handle: ConnectionHandle,
    name: Option<String>,
}

impl Session {
    /// Create a new session with a fresh identity
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            id: SessionId::new(),
            handle,
            name: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name as sent in rosters: empty if never set
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Check if this session has set its name
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    /// Set the session's name
    ///
    /// Returns false (and keeps the old name) if a name was already set.
    pub fn set_name(&mut self, name: String) -> bool {
        if self.name.is_some() {
            return false;
        }
        self.name = Some(name);
        true
    }

    /// Whether this session is currently a room member
    pub fn is_member(&self, room: &Room) -> bool {
        room.contains(self.id)
    }

    /// Whether this session is the room's host (first in join order)
    pub fn is_host(&self, room: &Room) -> bool {
        room.host() == Some(self.id)
    }
}
