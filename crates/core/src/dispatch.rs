//! Routing of inbound events to core operations
//!
//! Every failure stops here. The caller gets an `error` event, store
//! failures are logged and audited, and the connection carries on.

use tracing::{error, warn};

use crate::delivery;
use crate::effects::{Effect, Effects};
use crate::error::{Error, Result};
use crate::events::{ClientEvent, ServerEvent, SignalKind};
use crate::models::{AuditEntry, ConnectionId, Identity};
use crate::permissions::authorize_room;
use crate::presence;
use crate::rendezvous;
use crate::rooms::{default_rooms, RoomRegistry};
use crate::storage::Storage;

/// An authenticated connection and who is behind it
#[derive(Debug, Clone)]
pub struct Caller {
    pub connection: ConnectionId,
    pub identity: Identity,
}

impl Caller {
    pub fn new(connection: ConnectionId, identity: Identity) -> Self {
        Self {
            connection,
            identity,
        }
    }
}

/// Welcome the connection, join its default rooms and mark it online.
///
/// The connection is usable even if the presence write fails.
pub fn on_connect<S: Storage + ?Sized>(store: &S, caller: &Caller) -> Effects {
    let rooms = default_rooms(&caller.identity);
    let mut effects: Effects = rooms.iter().copied().map(Effect::Join).collect();
    effects.push(Effect::Reply(ServerEvent::Welcome {
        connection_id: caller.connection,
        user_id: caller.identity.id,
        rooms,
    }));
    match presence::mark_online(store, &caller.identity) {
        Ok(presence) => effects.extend(presence),
        Err(err) => effects.extend(failure_effects(caller, "connect", &err)),
    }
    effects.push(Effect::Audit(AuditEntry::new(
        caller.identity.id,
        "connect",
        "user",
    )));
    effects
}

/// Record a closed connection, marking the user offline when it was their
/// last one.
///
/// The caller decides `last_connection` under the same lock that removes the
/// connection, so two connections closing together cannot both see the other.
pub fn on_disconnect<S: Storage + ?Sized>(
    store: &S,
    caller: &Caller,
    last_connection: bool,
) -> Result<Effects> {
    let mut effects = if last_connection {
        presence::mark_offline(store, &caller.identity)?
    } else {
        Vec::new()
    };
    effects.push(Effect::Audit(AuditEntry::new(
        caller.identity.id,
        "disconnect",
        "user",
    )));
    Ok(effects)
}

fn route<S: Storage + ?Sized>(
    store: &S,
    rooms: &RoomRegistry,
    caller: &Caller,
    event: ClientEvent,
) -> Result<Effects> {
    let identity = &caller.identity;
    match event {
        ClientEvent::Hello { .. } => Err(Error::Validation(
            "connection is already authenticated".to_string(),
        )),
        ClientEvent::JoinRoom { room } => {
            authorize_room(store, identity, room)?;
            Ok(vec![
                Effect::Join(room),
                Effect::Reply(ServerEvent::RoomJoined { room }),
            ])
        }
        ClientEvent::LeaveRoom { room } => Ok(vec![
            Effect::Leave(room),
            Effect::Reply(ServerEvent::RoomLeft { room }),
        ]),
        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => presence::set_typing(store, identity, conversation_id, is_typing),
        ClientEvent::PresenceQuery { user_id } => presence::presence_status(store, user_id),
        ClientEvent::SendMessage {
            conversation_id,
            content,
        } => delivery::send(store, identity, conversation_id, &content),
        ClientEvent::AnnounceMessage { message_id } => {
            delivery::announce(store, identity, message_id)
        }
        ClientEvent::MessageDelivered { message_id } => {
            delivery::mark_delivered(store, identity, message_id)
        }
        ClientEvent::MessageRead { message_id } => delivery::mark_read(store, identity, message_id),
        ClientEvent::EnterWaitingRoom { session_id } => {
            rendezvous::enter_waiting_room(store, identity, session_id)
        }
        ClientEvent::LeaveWaitingRoom { session_id } => {
            rendezvous::leave_waiting_room(store, identity, session_id)
        }
        ClientEvent::EndCall { session_id } => rendezvous::end_call(store, identity, session_id),
        ClientEvent::WaitingRoomStatus { session_id } => {
            rendezvous::query_status(store, identity, session_id)
        }
        ClientEvent::WaitingRoomChat { session_id, text } => {
            rendezvous::waiting_room_chat(rooms, caller, session_id, &text)
        }
        ClientEvent::SessionChat {
            session_id,
            content,
        } => rendezvous::session_chat(store, identity, session_id, &content),
        ClientEvent::SessionStatus { session_id, status } => {
            rendezvous::update_session_status(store, identity, session_id, status)
        }
        ClientEvent::SignalOffer { session_id, payload } => {
            rendezvous::relay_signal(rooms, caller, SignalKind::Offer, session_id, payload)
        }
        ClientEvent::SignalAnswer { session_id, payload } => {
            rendezvous::relay_signal(rooms, caller, SignalKind::Answer, session_id, payload)
        }
        ClientEvent::SignalIce { session_id, payload } => {
            rendezvous::relay_signal(rooms, caller, SignalKind::IceCandidate, session_id, payload)
        }
    }
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::Hello { .. } => "hello",
        ClientEvent::JoinRoom { .. } => "join_room",
        ClientEvent::LeaveRoom { .. } => "leave_room",
        ClientEvent::Typing { .. } => "typing",
        ClientEvent::SendMessage { .. } => "send_message",
        ClientEvent::AnnounceMessage { .. } => "announce_message",
        ClientEvent::MessageDelivered { .. } => "message_delivered",
        ClientEvent::MessageRead { .. } => "message_read",
        ClientEvent::PresenceQuery { .. } => "presence_query",
        ClientEvent::EnterWaitingRoom { .. } => "enter_waiting_room",
        ClientEvent::LeaveWaitingRoom { .. } => "leave_waiting_room",
        ClientEvent::EndCall { .. } => "end_call",
        ClientEvent::WaitingRoomStatus { .. } => "waiting_room_status",
        ClientEvent::WaitingRoomChat { .. } => "waiting_room_chat",
        ClientEvent::SessionChat { .. } => "session_chat",
        ClientEvent::SessionStatus { .. } => "session_status",
        ClientEvent::SignalOffer { .. } => "signal_offer",
        ClientEvent::SignalAnswer { .. } => "signal_answer",
        ClientEvent::SignalIce { .. } => "signal_ice",
    }
}

/// Turn a failed operation into what the caller and the audit log see
pub fn failure_effects(caller: &Caller, action: &str, err: &Error) -> Effects {
    let mut effects = vec![Effect::Reply(ServerEvent::error(err.client_message()))];
    if err.is_persistence_failure() {
        error!(
            user_id = %caller.identity.id,
            connection = %caller.connection,
            action,
            error = %err,
            "Operation abandoned"
        );
        effects.push(Effect::Audit(
            AuditEntry::new(caller.identity.id, action, "realtime").failed(),
        ));
    } else {
        warn!(user_id = %caller.identity.id, action, error = %err, "Request refused");
    }
    effects
}

/// Handle one inbound event. Never fails; refusals become an `error` reply.
pub fn handle_event<S: Storage + ?Sized>(
    store: &S,
    rooms: &RoomRegistry,
    caller: &Caller,
    event: ClientEvent,
) -> Effects {
    let action = event_name(&event);
    match route(store, rooms, caller, event) {
        Ok(effects) => effects,
        Err(err) => failure_effects(caller, action, &err),
    }
}
