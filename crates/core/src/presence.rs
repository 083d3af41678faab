//! Presence tracking: online/offline transitions and typing indicators
//!
//! Presence events are fire-and-forget. Nothing here is queued for clients
//! that are not connected when the event goes out; a client that missed one
//! asks with `presence_query`.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::effects::{Effect, Effects};
use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::models::{ConversationId, Identity, Role, UserId};
use crate::permissions::can_access_conversation;
use crate::rooms::{room_for_office, room_for_user, RoomKey};
use crate::storage::{atomically, Storage};

/// Rooms told about an identity's presence changes
fn presence_rooms(identity: &Identity) -> Vec<RoomKey> {
    match (identity.role, identity.administered_office()) {
        (Role::OfficeAdmin, Some(office_id)) => vec![room_for_office(office_id), RoomKey::Admin],
        _ => vec![room_for_user(identity.id)],
    }
}

/// Last activity never moves backwards, even if clocks disagree
fn advance_activity<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let previous = store
        .find_identity(identity.id)?
        .and_then(|persisted| persisted.last_activity)
        .or(identity.last_activity);
    Ok(previous.map_or(now, |previous| previous.max(now)))
}

pub fn mark_online<S: Storage + ?Sized>(store: &S, identity: &Identity) -> Result<Effects> {
    let now = Utc::now();
    let at = advance_activity(store, identity, now)?;
    atomically(store, || {
        store.save_presence(identity.id, true, at)?;
        if store.open_login(identity.id, now)? {
            debug!(user_id = %identity.id, "Opened login log");
        }
        Ok(())
    })?;

    Ok(vec![Effect::emit_to(
        presence_rooms(identity),
        ServerEvent::PresenceChanged {
            user_id: identity.id,
            online: true,
            timestamp: at,
        },
    )])
}

pub fn mark_offline<S: Storage + ?Sized>(store: &S, identity: &Identity) -> Result<Effects> {
    let now = Utc::now();
    let at = advance_activity(store, identity, now)?;
    atomically(store, || {
        store.save_presence(identity.id, false, at)?;
        if !store.close_login(identity.id, now)? {
            debug!(user_id = %identity.id, "No open login log to close");
        }
        Ok(())
    })?;

    Ok(vec![Effect::emit_to(
        presence_rooms(identity),
        ServerEvent::PresenceChanged {
            user_id: identity.id,
            online: false,
            timestamp: at,
        },
    )])
}

/// Tell the other side of a conversation that `identity` is typing.
///
/// A student's keystrokes go to the office room; staff keystrokes go to the
/// student's personal room. The typist's own rooms never hear it.
pub fn set_typing<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    conversation_id: ConversationId,
    is_typing: bool,
) -> Result<Effects> {
    let conversation = store
        .find_conversation(conversation_id)?
        .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))?;
    if !can_access_conversation(identity, &conversation) {
        return Err(Error::AuthorizationDenied(format!(
            "user {} is not party to conversation {}",
            identity.id, conversation_id
        )));
    }

    let target = match identity.role {
        Role::Student => room_for_office(conversation.office_id),
        _ => room_for_user(conversation.student_user_id),
    };

    Ok(vec![Effect::emit(
        target,
        ServerEvent::TypingChanged {
            conversation_id,
            user_id: identity.id,
            is_typing,
        },
    )])
}

/// Answer an explicit status query from persisted state
pub fn presence_status<S: Storage + ?Sized>(store: &S, user_id: UserId) -> Result<Effects> {
    let identity = store
        .find_identity(user_id)?
        .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;

    Ok(vec![Effect::Reply(ServerEvent::PresenceStatus {
        user_id,
        online: identity.is_online,
        last_activity: identity.last_activity,
    })])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OfficeId;
    use crate::storage::IdentityRepository;
    use crate::testing::Fixture;

    fn emitted_rooms(effects: &Effects) -> Vec<RoomKey> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Emit { rooms, .. } => Some(rooms.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_office_admin_online_goes_to_office_and_admin_feed() {
        let fx = Fixture::new();
        let effects = mark_online(&fx.db, &fx.counselor).unwrap();

        assert_eq!(
            emitted_rooms(&effects),
            vec![RoomKey::Office(OfficeId(7)), RoomKey::Admin]
        );
        let persisted = fx.db.find_identity(fx.counselor.id).unwrap().unwrap();
        assert!(persisted.is_online);
        assert!(persisted.last_activity.is_some());
    }

    #[test]
    fn test_student_online_stays_in_own_room() {
        let fx = Fixture::new();
        let effects = mark_online(&fx.db, &fx.student).unwrap();
        assert_eq!(emitted_rooms(&effects), vec![RoomKey::User(fx.student.id)]);
    }

    #[test]
    fn test_repeated_online_keeps_one_login_and_monotonic_activity() {
        let fx = Fixture::new();
        mark_online(&fx.db, &fx.counselor).unwrap();
        let first = fx.db.find_identity(fx.counselor.id).unwrap().unwrap();

        let effects = mark_online(&fx.db, &fx.counselor).unwrap();
        assert_eq!(effects.len(), 1);
        let second = fx.db.find_identity(fx.counselor.id).unwrap().unwrap();

        assert!(second.last_activity >= first.last_activity);
        assert_eq!(fx.db.users().open_login_count(fx.counselor.id).unwrap(), 1);
    }

    #[test]
    fn test_offline_closes_login_log() {
        let fx = Fixture::new();
        mark_online(&fx.db, &fx.student).unwrap();
        let effects = mark_offline(&fx.db, &fx.student).unwrap();

        let persisted = fx.db.find_identity(fx.student.id).unwrap().unwrap();
        assert!(!persisted.is_online);
        assert_eq!(fx.db.users().open_login_count(fx.student.id).unwrap(), 0);
        assert!(matches!(
            effects[0].event(),
            Some(ServerEvent::PresenceChanged { online: false, .. })
        ));
    }

    #[test]
    fn test_typing_never_targets_own_room() {
        let fx = Fixture::new();
        let conversation = ConversationId(42);

        let effects = set_typing(&fx.db, &fx.student, conversation, true).unwrap();
        let rooms = emitted_rooms(&effects);
        assert_eq!(rooms, vec![RoomKey::Office(OfficeId(7))]);
        assert!(!rooms.contains(&RoomKey::User(fx.student.id)));

        let effects = set_typing(&fx.db, &fx.counselor, conversation, false).unwrap();
        let rooms = emitted_rooms(&effects);
        assert_eq!(rooms, vec![RoomKey::User(fx.student.id)]);
        assert!(!rooms.contains(&RoomKey::Office(OfficeId(7))));
    }

    #[test]
    fn test_typing_requires_party() {
        let fx = Fixture::new();
        let err = set_typing(&fx.db, &fx.other_student, ConversationId(42), true).unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied(_)));
    }

    #[test]
    fn test_presence_status_reads_persisted_state() {
        let fx = Fixture::new();
        mark_online(&fx.db, &fx.student).unwrap();

        let effects = presence_status(&fx.db, fx.student.id).unwrap();
        match &effects[0] {
            Effect::Reply(ServerEvent::PresenceStatus { online, last_activity, .. }) => {
                assert!(*online);
                assert!(last_activity.is_some());
            }
            other => panic!("unexpected effect: {:?}", other),
        }

        assert!(matches!(
            presence_status(&fx.db, UserId(999)),
            Err(Error::NotFound(_))
        ));
    }
}
