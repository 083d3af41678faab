//! Room naming and membership bookkeeping
//!
//! A room is a broadcast group: an event sent to a room reaches every
//! connection currently joined to it and nobody else. Nothing is queued.
//! Room names are derived from typed keys so two kinds of record can never
//! collide on the same name.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{ConnectionId, ConversationId, Identity, OfficeId, Role, SessionId, UserId};

/// Canonical room key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RoomKey {
    User(UserId),
    Office(OfficeId),
    Conversation(ConversationId),
    Session(SessionId),
    Call(SessionId),
    /// Super admin dashboard feed
    Admin,
}

pub fn room_for_user(user_id: UserId) -> RoomKey {
    RoomKey::User(user_id)
}

pub fn room_for_office(office_id: OfficeId) -> RoomKey {
    RoomKey::Office(office_id)
}

pub fn room_for_conversation(conversation_id: ConversationId) -> RoomKey {
    RoomKey::Conversation(conversation_id)
}

pub fn room_for_session(session_id: SessionId) -> RoomKey {
    RoomKey::Session(session_id)
}

pub fn room_for_call_session(session_id: SessionId) -> RoomKey {
    RoomKey::Call(session_id)
}

/// Rooms a freshly authenticated connection joins without asking
pub fn default_rooms(identity: &Identity) -> Vec<RoomKey> {
    let mut rooms = vec![room_for_user(identity.id)];
    match identity.role {
        Role::OfficeAdmin => {
            if let Some(office_id) = identity.office_id {
                rooms.push(room_for_office(office_id));
            }
        }
        Role::SuperAdmin => rooms.push(RoomKey::Admin),
        Role::Student => {}
    }
    rooms
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::User(id) => write!(f, "user:{}", id),
            RoomKey::Office(id) => write!(f, "office:{}", id),
            RoomKey::Conversation(id) => write!(f, "conversation:{}", id),
            RoomKey::Session(id) => write!(f, "session:{}", id),
            RoomKey::Call(id) => write!(f, "call:{}", id),
            RoomKey::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for RoomKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "admin" {
            return Ok(RoomKey::Admin);
        }

        let invalid = || Error::Validation(format!("unknown room '{}'", s));
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: i64 = id.parse().map_err(|_| invalid())?;

        match kind {
            "user" => Ok(RoomKey::User(UserId(id))),
            "office" => Ok(RoomKey::Office(OfficeId(id))),
            "conversation" => Ok(RoomKey::Conversation(ConversationId(id))),
            "session" => Ok(RoomKey::Session(SessionId(id))),
            "call" => Ok(RoomKey::Call(SessionId(id))),
            _ => Err(invalid()),
        }
    }
}

impl From<RoomKey> for String {
    fn from(room: RoomKey) -> Self {
        room.to_string()
    }
}

impl TryFrom<String> for RoomKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which rooms each live connection has joined, indexed both ways
#[derive(Debug, Default)]
pub struct RoomRegistry {
    by_connection: HashMap<ConnectionId, HashSet<RoomKey>>,
    by_room: HashMap<RoomKey, HashSet<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room. Returns false if the connection was already a member.
    pub fn join(&mut self, connection: ConnectionId, room: RoomKey) -> bool {
        let added = self
            .by_connection
            .entry(connection)
            .or_default()
            .insert(room);
        if added {
            self.by_room.entry(room).or_default().insert(connection);
        }
        added
    }

    /// Leave a room. Returns false if the connection was not a member.
    pub fn leave(&mut self, connection: ConnectionId, room: RoomKey) -> bool {
        let removed = self
            .by_connection
            .get_mut(&connection)
            .map(|rooms| rooms.remove(&room))
            .unwrap_or(false);

        if removed {
            self.forget_member(room, connection);
        }
        removed
    }

    /// Drop every membership of a connection (disconnect)
    pub fn leave_all(&mut self, connection: ConnectionId) -> Vec<RoomKey> {
        let rooms: Vec<RoomKey> = self
            .by_connection
            .remove(&connection)
            .map(|rooms| rooms.into_iter().collect())
            .unwrap_or_default();

        for room in &rooms {
            self.forget_member(*room, connection);
        }
        rooms
    }

    fn forget_member(&mut self, room: RoomKey, connection: ConnectionId) {
        if let Some(members) = self.by_room.get_mut(&room) {
            members.remove(&connection);
            if members.is_empty() {
                self.by_room.remove(&room);
            }
        }
    }

    pub fn is_member(&self, connection: ConnectionId, room: RoomKey) -> bool {
        self.by_room
            .get(&room)
            .map(|members| members.contains(&connection))
            .unwrap_or(false)
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> Vec<RoomKey> {
        self.by_connection
            .get(&connection)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn members(&self, room: RoomKey) -> Vec<ConnectionId> {
        self.by_room
            .get(&room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Connections reached by an event sent to several rooms at once.
    ///
    /// A connection joined to more than one of the rooms appears once.
    pub fn audience(&self, rooms: &[RoomKey], except: Option<ConnectionId>) -> Vec<ConnectionId> {
        let mut seen = HashSet::new();
        for room in rooms {
            if let Some(members) = self.by_room.get(room) {
                seen.extend(members.iter().copied());
            }
        }
        if let Some(except) = except {
            seen.remove(&except);
        }
        seen.into_iter().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentId;

    #[test]
    fn test_room_names_are_namespaced() {
        assert_eq!(room_for_user(UserId(7)).to_string(), "user:7");
        assert_eq!(room_for_office(OfficeId(7)).to_string(), "office:7");
        assert_eq!(room_for_call_session(SessionId(9)).to_string(), "call:9");
        assert_ne!(room_for_session(SessionId(9)), room_for_call_session(SessionId(9)));
    }

    #[test]
    fn test_room_name_parsing() {
        let room: RoomKey = "conversation:42".parse().unwrap();
        assert_eq!(room, room_for_conversation(ConversationId(42)));
        assert_eq!("admin".parse::<RoomKey>().unwrap(), RoomKey::Admin);
        assert!("inquiry_42".parse::<RoomKey>().is_err());
        assert!("office:abc".parse::<RoomKey>().is_err());
    }

    #[test]
    fn test_room_serializes_as_name() {
        let json = serde_json::to_string(&room_for_session(SessionId(3))).unwrap();
        assert_eq!(json, "\"session:3\"");
        let back: RoomKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RoomKey::Session(SessionId(3)));
    }

    #[test]
    fn test_join_and_leave_are_idempotent() {
        let mut registry = RoomRegistry::new();
        let conn = ConnectionId::new();
        let room = room_for_office(OfficeId(1));

        assert!(registry.join(conn, room));
        assert!(!registry.join(conn, room));
        assert_eq!(registry.members(room), vec![conn]);

        assert!(registry.leave(conn, room));
        assert!(!registry.leave(conn, room));
        assert!(registry.members(room).is_empty());
        assert!(!registry.leave(ConnectionId::new(), room));
    }

    #[test]
    fn test_leave_all_clears_every_room() {
        let mut registry = RoomRegistry::new();
        let conn = ConnectionId::new();
        registry.join(conn, room_for_user(UserId(1)));
        registry.join(conn, RoomKey::Admin);

        let left = registry.leave_all(conn);
        assert_eq!(left.len(), 2);
        assert!(registry.rooms_of(conn).is_empty());
        assert!(registry.members(RoomKey::Admin).is_empty());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_audience_deduplicates_and_excludes() {
        let mut registry = RoomRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let conv = room_for_conversation(ConversationId(42));
        let office = room_for_office(OfficeId(7));

        registry.join(a, conv);
        registry.join(a, office);
        registry.join(b, office);

        let mut everyone = registry.audience(&[conv, office], None);
        everyone.sort_by_key(|c| c.0);
        let mut expected = vec![a, b];
        expected.sort_by_key(|c| c.0);
        assert_eq!(everyone, expected);

        assert_eq!(registry.audience(&[conv, office], Some(a)), vec![b]);
    }

    #[test]
    fn test_default_rooms_by_role() {
        let student = Identity::student(UserId(3), StudentId(30), "Sam");
        assert_eq!(default_rooms(&student), vec![room_for_user(UserId(3))]);

        let admin = Identity::office_admin(UserId(4), OfficeId(7), "Ana");
        assert_eq!(
            default_rooms(&admin),
            vec![room_for_user(UserId(4)), room_for_office(OfficeId(7))]
        );

        let root = Identity::super_admin(UserId(1), "Root");
        assert_eq!(default_rooms(&root), vec![room_for_user(UserId(1)), RoomKey::Admin]);
    }
}
