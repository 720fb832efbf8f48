//! Connection registry
//!
//! Owns every `Session`, keyed by the transport handle it arrived on.
//! Sessions are created on connect and destroyed on disconnect; room
//! membership is pruned before the entry goes away so the room never
//! refers to a session that no longer exists.

use std::collections::HashMap;

use crate::error::RelayError;
use crate::room::Room;
use crate::session::Session;
use crate::types::{ConnectionHandle, SessionId};

/// Result of removing a connection
#[derive(Debug)]
pub struct Departure {
    /// The removed session
    pub session: Session,
    /// Whether the session was a room member (and has now left)
    pub left_room: bool,
}

/// Handle → Session map with an identity index
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<ConnectionHandle, Session>,
    by_id: HashMap<SessionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and create its session
    pub fn on_connect(&mut self, handle: ConnectionHandle) -> Result<&Session, RelayError> {
        if self.sessions.contains_key(&handle) {
            return Err(RelayError::DuplicateConnection(handle));
        }
        let session = Session::new(handle);
        self.by_id.insert(session.id(), handle);
        Ok(self.sessions.entry(handle).or_insert(session))
    }

    /// Remove a connection, leaving the room first if it was a member
    pub fn on_disconnect(
        &mut self,
        handle: ConnectionHandle,
        room: &mut Room,
    ) -> Result<Departure, RelayError> {
        let session = self
            .sessions
            .remove(&handle)
            .ok_or(RelayError::UnknownConnection(handle))?;
        self.by_id.remove(&session.id());
        let left_room = room.leave(session.id());
        Ok(Departure { session, left_room })
    }

    /// Look up the session for a handle
    pub fn lookup(&self, handle: ConnectionHandle) -> Result<&Session, RelayError> {
        self.sessions
            .get(&handle)
            .ok_or(RelayError::UnknownConnection(handle))
    }

    pub fn lookup_mut(&mut self, handle: ConnectionHandle) -> Result<&mut Session, RelayError> {
        self.sessions
            .get_mut(&handle)
            .ok_or(RelayError::UnknownConnection(handle))
    }

    /// Look up a session by identity
    pub fn get_by_id(&self, id: SessionId) -> Option<&Session> {
        self.by_id.get(&id).and_then(|h| self.sessions.get(h))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session and empty the room
    pub fn clear(&mut self, room: &mut Room) {
        for session in self.sessions.values() {
            room.leave(session.id());
        }
        self.sessions.clear();
        self.by_id.clear();
    }
}
