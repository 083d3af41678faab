//! Call rendezvous for video counseling sessions
//!
//! Each session has two waiting-room slots, one for the student and one for
//! the assigned counselor. When both are filled the call starts; when either
//! leaves it stops. Negotiation payloads are relayed between the two call
//! room members without being read or stored.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::dispatch::Caller;
use crate::effects::{Effect, Effects};
use crate::error::{Error, Result};
use crate::events::{CallUpdate, ServerEvent, Signal, SignalKind};
use crate::models::{
    AuditEntry, CounselingSession, Identity, NewNotification, Role, SessionId, SessionStatus,
    WaitingSide,
};
use crate::permissions::{can_end_call, can_join_session, can_update_session};
use crate::rooms::{
    room_for_call_session, room_for_office, room_for_session, room_for_user, RoomKey,
    RoomRegistry,
};
use crate::storage::{atomically, Storage};

const MAX_CHAT_CHARS: usize = 1000;

fn load_session<S: Storage + ?Sized>(store: &S, id: SessionId) -> Result<CounselingSession> {
    store
        .find_session(id)?
        .ok_or_else(|| Error::NotFound(format!("session {}", id)))
}

fn party_side(identity: &Identity, session: &CounselingSession) -> Result<WaitingSide> {
    session.side_of(identity).ok_or_else(|| {
        Error::AuthorizationDenied(format!(
            "user {} is not a party to session {}",
            identity.id, session.id
        ))
    })
}

fn call_rooms(id: SessionId) -> Vec<RoomKey> {
    vec![room_for_session(id), room_for_call_session(id)]
}

fn ensure_in_call_room(rooms: &RoomRegistry, caller: &Caller, id: SessionId) -> Result<()> {
    if rooms.is_member(caller.connection, room_for_call_session(id)) {
        Ok(())
    } else {
        Err(Error::AuthorizationDenied(format!(
            "connection {} is not in the call for session {}",
            caller.connection, id
        )))
    }
}

/// Fill the caller's slot, and start the call if that completes the pair
pub fn enter_waiting_room<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    session_id: SessionId,
) -> Result<Effects> {
    let mut session = load_session(store, session_id)?;
    let side = party_side(identity, &session)?;
    if !session.is_video {
        return Err(Error::Validation(format!(
            "session {} is not a video session",
            session_id
        )));
    }
    if session.status.is_terminal() {
        return Err(Error::Validation(format!(
            "session {} is already {}",
            session_id,
            session.status.as_str()
        )));
    }

    let now = Utc::now();
    session.set_waiting(side, true);
    let started = atomically(store, || {
        store.set_waiting_flag(session_id, side, true)?;
        if !store.open_participation(session_id, identity.id, now)? {
            debug!(session_id = %session_id, user_id = %identity.id, "Participation already open");
        }
        Ok(session.both_waiting()
            && session.call_started_at.is_none()
            && store.start_call(session_id, now)?)
    })?;

    let mut effects = vec![
        Effect::Join(room_for_call_session(session_id)),
        Effect::emit_to(
            call_rooms(session_id),
            ServerEvent::ParticipantJoined(CallUpdate::of(&session, Some(identity.id))),
        ),
        Effect::Audit(
            AuditEntry::new(identity.id, "enter_waiting_room", "counseling_session")
                .target(session_id.0),
        ),
    ];

    if started {
        session.call_started_at = Some(now);
        info!(session_id = %session_id, "Call started");
        effects.push(Effect::emit_to(
            call_rooms(session_id),
            ServerEvent::CallStarted(CallUpdate::of(&session, None)),
        ));
    }

    Ok(effects)
}

/// Vacate the caller's slot. Either party leaving stops the call.
pub fn leave_waiting_room<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    session_id: SessionId,
) -> Result<Effects> {
    let mut session = load_session(store, session_id)?;
    let side = party_side(identity, &session)?;

    let now = Utc::now();
    let left = atomically(store, || {
        let closed = store.close_participation(session_id, identity.id, now)?;
        if !closed && !session.is_waiting(side) {
            return Ok(false);
        }
        store.set_waiting_flag(session_id, side, false)?;
        store.clear_call_started(session_id)?;
        Ok(true)
    })?;
    if !left {
        return Ok(Vec::new());
    }

    session.set_waiting(side, false);
    if session.call_started_at.take().is_some() {
        info!(session_id = %session_id, user_id = %identity.id, "Call interrupted");
    }

    Ok(vec![
        Effect::emit_to(
            call_rooms(session_id),
            ServerEvent::ParticipantLeft(CallUpdate::of(&session, Some(identity.id))),
        ),
        Effect::Leave(room_for_call_session(session_id)),
        Effect::Audit(
            AuditEntry::new(identity.id, "leave_waiting_room", "counseling_session")
                .target(session_id.0),
        ),
    ])
}

/// Forward a negotiation payload to the other side of the call
pub fn relay_signal(
    rooms: &RoomRegistry,
    caller: &Caller,
    kind: SignalKind,
    session_id: SessionId,
    payload: Value,
) -> Result<Effects> {
    ensure_in_call_room(rooms, caller, session_id)?;

    let signal = Signal {
        session_id,
        sender_id: caller.identity.id,
        payload,
    };
    Ok(vec![Effect::emit_except(
        room_for_call_session(session_id),
        ServerEvent::signal(kind, signal),
        caller.connection,
    )])
}

pub fn query_status<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    session_id: SessionId,
) -> Result<Effects> {
    let session = load_session(store, session_id)?;
    if !can_join_session(identity, &session) {
        return Err(Error::AuthorizationDenied(format!(
            "user {} may not view session {}",
            identity.id, session_id
        )));
    }
    Ok(vec![Effect::Reply(ServerEvent::WaitingRoomStatus(
        CallUpdate::of(&session, None),
    ))])
}

/// Close the call for both parties and mark the session completed
pub fn end_call<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    session_id: SessionId,
) -> Result<Effects> {
    let mut session = load_session(store, session_id)?;
    if !can_end_call(identity, &session) {
        return Err(Error::AuthorizationDenied(format!(
            "user {} may not end the call for session {}",
            identity.id, session_id
        )));
    }

    let now = Utc::now();
    let closed = atomically(store, || {
        let closed = store.close_all_participations(session_id, now)?;
        for side in [WaitingSide::Counselor, WaitingSide::Student] {
            store.set_waiting_flag(session_id, side, false)?;
        }
        store.clear_call_started(session_id)?;
        store.set_session_status(session_id, SessionStatus::Completed)?;
        Ok(closed)
    })?;
    for side in [WaitingSide::Counselor, WaitingSide::Student] {
        session.set_waiting(side, false);
    }
    session.call_started_at = None;
    session.status = SessionStatus::Completed;
    info!(session_id = %session_id, closed, "Call ended");

    Ok(vec![
        Effect::emit_to(
            call_rooms(session_id),
            ServerEvent::CallEnded(CallUpdate::of(&session, Some(identity.id))),
        ),
        Effect::Leave(room_for_call_session(session_id)),
        Effect::Audit(
            AuditEntry::new(identity.id, "end_call", "counseling_session").target(session_id.0),
        ),
    ])
}

/// Short text between the two parties while they wait
pub fn waiting_room_chat(
    rooms: &RoomRegistry,
    caller: &Caller,
    session_id: SessionId,
    text: &str,
) -> Result<Effects> {
    let text = chat_text(text)?;
    ensure_in_call_room(rooms, caller, session_id)?;

    Ok(vec![Effect::emit_except(
        room_for_call_session(session_id),
        ServerEvent::WaitingRoomChat {
            session_id,
            sender_id: caller.identity.id,
            sender_name: caller.identity.display_name.clone(),
            text: text.to_string(),
            timestamp: Utc::now(),
        },
        caller.connection,
    )])
}

fn chat_text(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Validation("chat text is empty".to_string()));
    }
    if text.chars().count() > MAX_CHAT_CHARS {
        return Err(Error::Validation(format!(
            "chat text exceeds {} characters",
            MAX_CHAT_CHARS
        )));
    }
    Ok(text)
}

/// Chat to the whole session room, sender included
pub fn session_chat<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    session_id: SessionId,
    content: &str,
) -> Result<Effects> {
    let content = chat_text(content)?;
    let session = load_session(store, session_id)?;
    if !can_join_session(identity, &session) {
        return Err(Error::AuthorizationDenied(format!(
            "user {} may not chat in session {}",
            identity.id, session_id
        )));
    }

    Ok(vec![Effect::emit(
        room_for_session(session_id),
        ServerEvent::SessionChatMessage {
            session_id,
            sender_id: identity.id,
            sender_name: identity.display_name.clone(),
            sender_role: identity.role,
            content: content.to_string(),
            timestamp: Utc::now(),
        },
    )])
}

/// Apply a scheduling status change coming from either side of a session.
///
/// Students may only cancel their own session; staff and super admins may
/// set any status. Finished sessions stay finished.
pub fn update_session_status<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    session_id: SessionId,
    status: SessionStatus,
) -> Result<Effects> {
    let session = load_session(store, session_id)?;
    if !can_update_session(identity, &session) {
        return Err(Error::AuthorizationDenied(format!(
            "user {} may not update session {}",
            identity.id, session_id
        )));
    }
    if identity.role == Role::Student && status != SessionStatus::Cancelled {
        return Err(Error::AuthorizationDenied(
            "students may only cancel a session".to_string(),
        ));
    }
    if session.status.is_terminal() {
        return Err(Error::Validation(format!(
            "session {} is already {}",
            session_id,
            session.status.as_str()
        )));
    }
    if session.status == status {
        return Ok(Vec::new());
    }

    store.set_session_status(session_id, status)?;
    info!(session_id = %session_id, status = status.as_str(), updated_by = %identity.id, "Session status changed");

    let mut effects = vec![Effect::emit_to(
        vec![
            room_for_session(session_id),
            room_for_office(session.office_id),
            room_for_user(session.student_user_id),
        ],
        ServerEvent::SessionStatusChanged {
            session_id,
            status,
            updated_by: identity.id,
        },
    )];

    let recipient = if identity.id == session.student_user_id {
        session.counselor_id
    } else {
        Some(session.student_user_id)
    };
    if let Some(recipient) = recipient {
        effects.push(Effect::Notify(NewNotification::new(
            recipient,
            "Counseling session updated",
            format!(
                "Session scheduled for {} is now {}",
                session.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
                status.as_str()
            ),
        )));
    }
    effects.push(Effect::Audit(
        AuditEntry::new(identity.id, "update_session_status", "counseling_session")
            .target(session_id.0),
    ));
    Ok(effects)
}
