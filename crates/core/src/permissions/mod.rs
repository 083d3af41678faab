//! Access rules for rooms, conversations and sessions
//!
//! Authentication happens upstream; these checks only decide what an
//! already-resolved identity is entitled to.

use crate::error::{Error, Result};
use crate::models::{Conversation, CounselingSession, Identity, Role, WaitingSide};
use crate::rooms::RoomKey;
use crate::storage::Storage;

/// Student who owns the inquiry, or an admin of the office it is addressed to
pub fn can_access_conversation(identity: &Identity, conversation: &Conversation) -> bool {
    match identity.role {
        Role::Student => identity.owned_student() == Some(conversation.student_id),
        Role::OfficeAdmin => identity.administered_office() == Some(conversation.office_id),
        Role::SuperAdmin => false,
    }
}

/// Student, assigned counselor, or any super admin
pub fn can_join_session(identity: &Identity, session: &CounselingSession) -> bool {
    identity.is_super_admin() || session.side_of(identity).is_some()
}

/// Only the two call parties
pub fn can_join_call(identity: &Identity, session: &CounselingSession) -> bool {
    session.side_of(identity).is_some()
}

/// Office staff of the session's office, its student, or a super admin
pub fn can_update_session(identity: &Identity, session: &CounselingSession) -> bool {
    match identity.role {
        Role::SuperAdmin => true,
        Role::OfficeAdmin => identity.administered_office() == Some(session.office_id),
        Role::Student => identity.owned_student() == Some(session.student_id),
    }
}

/// The counselor closes the call; super admins may force it
pub fn can_end_call(identity: &Identity, session: &CounselingSession) -> bool {
    identity.is_super_admin() || session.side_of(identity) == Some(WaitingSide::Counselor)
}

fn denied(identity: &Identity, room: RoomKey) -> Error {
    Error::AuthorizationDenied(format!("user {} may not join {}", identity.id, room))
}

/// Decide whether `identity` may join `room`, looking up records as needed
pub fn authorize_room<S: Storage + ?Sized>(
    store: &S,
    identity: &Identity,
    room: RoomKey,
) -> Result<()> {
    let allowed = match room {
        RoomKey::User(user_id) => user_id == identity.id,
        RoomKey::Office(office_id) => {
            identity.is_super_admin() || identity.administered_office() == Some(office_id)
        }
        RoomKey::Admin => identity.is_super_admin(),
        RoomKey::Conversation(id) => {
            let conversation = store
                .find_conversation(id)?
                .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))?;
            can_access_conversation(identity, &conversation)
        }
        RoomKey::Session(id) => {
            let session = store
                .find_session(id)?
                .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;
            can_join_session(identity, &session)
        }
        RoomKey::Call(id) => {
            let session = store
                .find_session(id)?
                .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;
            can_join_call(identity, &session)
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(denied(identity, room))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationId, OfficeId, SessionId, StudentId, UserId};
    use crate::testing::Fixture;

    #[test]
    fn test_conversation_access() {
        let fx = Fixture::new();
        let conv = fx.conversation();

        assert!(can_access_conversation(&fx.student, &conv));
        assert!(can_access_conversation(&fx.counselor, &conv));
        assert!(!can_access_conversation(&fx.other_student, &conv));
        assert!(!can_access_conversation(&fx.other_office_admin, &conv));
        assert!(!can_access_conversation(&fx.super_admin, &conv));
    }

    #[test]
    fn test_session_and_call_access() {
        let fx = Fixture::new();
        let session = fx.session();

        assert!(can_join_session(&fx.super_admin, &session));
        assert!(!can_join_call(&fx.super_admin, &session));
        assert!(can_join_call(&fx.counselor, &session));
        assert!(can_join_call(&fx.student, &session));
        assert!(!can_join_session(&fx.other_student, &session));
    }

    #[test]
    fn test_authorize_room() {
        let fx = Fixture::new();
        let db = &fx.db;

        assert!(authorize_room(db, &fx.student, RoomKey::User(fx.student.id)).is_ok());
        assert!(authorize_room(db, &fx.student, RoomKey::User(fx.counselor.id)).is_err());
        assert!(authorize_room(db, &fx.counselor, RoomKey::Office(OfficeId(7))).is_ok());
        assert!(authorize_room(db, &fx.counselor, RoomKey::Office(OfficeId(8))).is_err());
        assert!(authorize_room(db, &fx.super_admin, RoomKey::Office(OfficeId(8))).is_ok());
        assert!(authorize_room(db, &fx.counselor, RoomKey::Admin).is_err());
        assert!(authorize_room(db, &fx.student, RoomKey::Conversation(ConversationId(42))).is_ok());
        assert!(matches!(
            authorize_room(db, &fx.other_student, RoomKey::Conversation(ConversationId(42))),
            Err(Error::AuthorizationDenied(_))
        ));
        assert!(matches!(
            authorize_room(db, &fx.student, RoomKey::Session(SessionId(404))),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_rights() {
        let fx = Fixture::new();
        let session = fx.session();
        let colleague = Identity::office_admin(UserId(21), OfficeId(7), "Dee");
        let stranger = Identity::student(UserId(99), StudentId(990), "Max");

        assert!(can_update_session(&colleague, &session));
        assert!(!can_end_call(&colleague, &session));
        assert!(can_end_call(&fx.counselor, &session));
        assert!(!can_update_session(&stranger, &session));
    }
}
