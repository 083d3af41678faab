//! Shared fixture for unit tests

use chrono::Utc;

use crate::models::{
    Conversation, ConversationId, CounselingSession, Identity, OfficeId, SessionId,
    SessionStatus, StudentId, UserId,
};
use crate::storage::{ConversationRepository, Database, SessionRepository};

/// In-memory database seeded with one office, its counselor, two students,
/// conversation 42 (pending, office 7) and session 9 (student 30, counselor 20).
/// Session 10 has no counselor assigned.
pub struct Fixture {
    pub db: Database,
    pub student: Identity,
    pub other_student: Identity,
    pub counselor: Identity,
    pub other_office_admin: Identity,
    pub super_admin: Identity,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();

        let student = Identity::student(UserId(3), StudentId(30), "Sam");
        let other_student = Identity::student(UserId(4), StudentId(40), "Olive");
        let counselor = Identity::office_admin(UserId(20), OfficeId(7), "Cora");
        let other_office_admin = Identity::office_admin(UserId(22), OfficeId(8), "Otto");
        let super_admin = Identity::super_admin(UserId(1), "Root");

        for identity in [&student, &other_student, &counselor, &other_office_admin, &super_admin] {
            db.users().create(identity).unwrap();
        }

        db.conversations()
            .create(&Conversation::new(
                ConversationId(42),
                OfficeId(7),
                StudentId(30),
                UserId(3),
            ))
            .unwrap();

        for (id, counselor_id) in [(9, Some(UserId(20))), (10, None)] {
            db.sessions()
                .create(&CounselingSession {
                    id: SessionId(id),
                    student_id: StudentId(30),
                    student_user_id: UserId(3),
                    counselor_id,
                    office_id: OfficeId(7),
                    scheduled_at: Utc::now(),
                    status: SessionStatus::Confirmed,
                    is_video: true,
                    counselor_in_waiting_room: false,
                    student_in_waiting_room: false,
                    call_started_at: None,
                })
                .unwrap();
        }

        Self {
            db,
            student,
            other_student,
            counselor,
            other_office_admin,
            super_admin,
        }
    }

    pub fn conversation(&self) -> Conversation {
        self.db.find_conversation(ConversationId(42)).unwrap().unwrap()
    }

    pub fn session(&self) -> CounselingSession {
        self.db.find_session(SessionId(9)).unwrap().unwrap()
    }

    pub fn session_by_id(&self, id: i64) -> CounselingSession {
        self.db.find_session(SessionId(id)).unwrap().unwrap()
    }
}
