//! Side effects produced by core operations
//!
//! Core operations persist the records they own and return everything else
//! (broadcasts, replies, room changes, inbox and audit writes) as a list of
//! effects. The server applies them in order after the operation succeeds,
//! so a failed operation never leaks a partial broadcast.

use crate::events::ServerEvent;
use crate::models::{AuditEntry, ConnectionId, NewNotification};
use crate::rooms::RoomKey;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send to every connection joined to any of `rooms`, once each
    Emit {
        rooms: Vec<RoomKey>,
        event: ServerEvent,
        except: Option<ConnectionId>,
    },
    /// Send to the calling connection only
    Reply(ServerEvent),
    /// Add the calling connection to a room
    Join(RoomKey),
    /// Remove the calling connection from a room
    Leave(RoomKey),
    /// Write to a user's inbox
    Notify(NewNotification),
    /// Write to the audit log; failures are swallowed
    Audit(AuditEntry),
}

impl Effect {
    pub fn emit(room: RoomKey, event: ServerEvent) -> Self {
        Effect::Emit {
            rooms: vec![room],
            event,
            except: None,
        }
    }

    pub fn emit_to(rooms: Vec<RoomKey>, event: ServerEvent) -> Self {
        Effect::Emit {
            rooms,
            event,
            except: None,
        }
    }

    pub fn emit_except(room: RoomKey, event: ServerEvent, except: ConnectionId) -> Self {
        Effect::Emit {
            rooms: vec![room],
            event,
            except: Some(except),
        }
    }

    /// Event carried by an emit or reply
    pub fn event(&self) -> Option<&ServerEvent> {
        match self {
            Effect::Emit { event, .. } | Effect::Reply(event) => Some(event),
            _ => None,
        }
    }
}

pub type Effects = Vec<Effect>;
