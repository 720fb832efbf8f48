//! Room struct definition
//!
//! The single shared room every joined session relays through.

use crate::error::RelayError;
use crate::types::SessionId;

/// Ordered room membership
///
/// Insertion order is join order; position 0 is the host. Holds session
/// identities only, the registry owns the sessions themselves.
#[derive(Debug, Default)]
pub struct Room {
    members: Vec<SessionId>,
}

impl Room {
    /// Create an empty room
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a session to the room
    ///
    /// Fails with `AlreadyMember` if the session is already present.
    pub fn join(&mut self, id: SessionId) -> Result<(), RelayError> {
        if self.contains(id) {
            return Err(RelayError::AlreadyMember);
        }
        self.members.push(id);
        Ok(())
    }

    /// Remove a session from the room
    ///
    /// Returns true if the session was a member. Remaining members keep
    /// their relative order, so the next in line becomes host.
    pub fn leave(&mut self, id: SessionId) -> bool {
        match self.members.iter().position(|m| *m == id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    /// Check if a session is in this room
    pub fn contains(&self, id: SessionId) -> bool {
        self.members.contains(&id)
    }

    /// The host (first member), if any
    pub fn host(&self) -> Option<SessionId> {
        self.members.first().copied()
    }

    /// All members in join order
    pub fn all_members(&self) -> &[SessionId] {
        &self.members
    }

    /// All members in join order except `id`
    pub fn members_except(&self, id: SessionId) -> impl Iterator<Item = SessionId> + '_ {
        self.members.iter().copied().filter(move |m| *m != id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<SessionId> {
        (0..n).map(|_| SessionId::new()).collect()
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new();
        assert!(room.is_empty());
        assert!(room.host().is_none());
        assert_eq!(room.len(), 0);
    }

    #[test]
    fn test_room_join_order_and_host() {
        let ids = ids(3);
        let mut room = Room::new();
        for id in &ids {
            room.join(*id).unwrap();
        }

        assert_eq!(room.all_members(), ids.as_slice());
        assert_eq!(room.host(), Some(ids[0]));
        assert_eq!(room.len(), 3);
    }

    #[test]
    fn test_room_double_join_rejected() {
        let id = SessionId::new();
        let mut room = Room::new();

        room.join(id).unwrap();
        assert!(matches!(room.join(id), Err(RelayError::AlreadyMember)));
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_room_members_except_keeps_order() {
        let ids = ids(5);
        let mut room = Room::new();
        for id in &ids {
            room.join(*id).unwrap();
        }

        for (k, excluded) in ids.iter().enumerate() {
            let others: Vec<SessionId> = room.members_except(*excluded).collect();
            let mut expected = ids.clone();
            expected.remove(k);
            assert_eq!(others, expected);
        }
    }

    #[test]
    fn test_room_members_except_non_member() {
        let ids = ids(2);
        let mut room = Room::new();
        room.join(ids[0]).unwrap();

        let others: Vec<SessionId> = room.members_except(ids[1]).collect();
        assert_eq!(others, vec![ids[0]]);
    }

    #[test]
    fn test_room_leave() {
        let ids = ids(3);
        let mut room = Room::new();
        for id in &ids {
            room.join(*id).unwrap();
        }

        // Host leaves, next in line is promoted
        assert!(room.leave(ids[0]));
        assert_eq!(room.host(), Some(ids[1]));
        assert_eq!(room.all_members(), &[ids[1], ids[2]]);

        // Leaving twice is a no-op
        assert!(!room.leave(ids[0]));
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn test_room_rejoin_after_leave() {
        let ids = ids(2);
        let mut room = Room::new();
        room.join(ids[0]).unwrap();
        room.join(ids[1]).unwrap();
        room.leave(ids[0]);
        room.join(ids[0]).unwrap();

        assert_eq!(room.all_members(), &[ids[1], ids[0]]);
    }
}
