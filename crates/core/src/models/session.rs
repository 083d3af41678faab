//! Counseling session model and waiting-room state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Identity, OfficeId, Role, SessionId, StudentId, UserId};

/// Scheduling status of a counseling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::NoShow => "no_show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SessionStatus::Pending),
            "confirmed" => Some(SessionStatus::Confirmed),
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            // older rows used the hyphenated spelling
            "no_show" | "no-show" => Some(SessionStatus::NoShow),
            _ => None,
        }
    }

    /// Terminal statuses close the waiting room for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::NoShow
        )
    }
}

/// Aggregate waiting-room state derived from the two flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingState {
    NoOneWaiting,
    OneWaiting,
    BothWaiting,
    InCall,
    Ended,
}

/// Which of the two waiting-room slots a participant occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingSide {
    Counselor,
    Student,
}

/// A scheduled counseling session between a student and a counselor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounselingSession {
    pub id: SessionId,
    pub student_id: StudentId,
    /// Account of the student who owns `student_id`
    pub student_user_id: UserId,
    pub counselor_id: Option<UserId>,
    pub office_id: OfficeId,
    pub scheduled_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub is_video: bool,
    pub counselor_in_waiting_room: bool,
    pub student_in_waiting_room: bool,
    pub call_started_at: Option<DateTime<Utc>>,
}

impl CounselingSession {
    /// Slot the given identity would occupy, or None if it is not a party
    pub fn side_of(&self, identity: &Identity) -> Option<WaitingSide> {
        match identity.role {
            Role::Student if identity.owned_student() == Some(self.student_id) => {
                Some(WaitingSide::Student)
            }
            Role::OfficeAdmin if self.counselor_id == Some(identity.id) => {
                Some(WaitingSide::Counselor)
            }
            _ => None,
        }
    }

    pub fn is_waiting(&self, side: WaitingSide) -> bool {
        match side {
            WaitingSide::Counselor => self.counselor_in_waiting_room,
            WaitingSide::Student => self.student_in_waiting_room,
        }
    }

    pub fn set_waiting(&mut self, side: WaitingSide, waiting: bool) {
        match side {
            WaitingSide::Counselor => self.counselor_in_waiting_room = waiting,
            WaitingSide::Student => self.student_in_waiting_room = waiting,
        }
    }

    /// Both slots filled. A session without a counselor never qualifies.
    pub fn both_waiting(&self) -> bool {
        self.counselor_id.is_some() && self.counselor_in_waiting_room && self.student_in_waiting_room
    }

    pub fn waiting_state(&self) -> WaitingState {
        if self.status.is_terminal() {
            return WaitingState::Ended;
        }
        if self.both_waiting() {
            return if self.call_started_at.is_some() {
                WaitingState::InCall
            } else {
                WaitingState::BothWaiting
            };
        }
        if self.counselor_in_waiting_room || self.student_in_waiting_room {
            WaitingState::OneWaiting
        } else {
            WaitingState::NoOneWaiting
        }
    }

    /// User ids of both parties, counselor first when assigned
    pub fn party_user_ids(&self) -> Vec<UserId> {
        let mut ids = Vec::with_capacity(2);
        if let Some(counselor) = self.counselor_id {
            ids.push(counselor);
        }
        ids.push(self.student_user_id);
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CounselingSession {
        CounselingSession {
            id: SessionId(9),
            student_id: StudentId(30),
            student_user_id: UserId(3),
            counselor_id: Some(UserId(20)),
            office_id: OfficeId(7),
            scheduled_at: Utc::now(),
            status: SessionStatus::Confirmed,
            is_video: true,
            counselor_in_waiting_room: false,
            student_in_waiting_room: false,
            call_started_at: None,
        }
    }

    #[test]
    fn test_waiting_state_progression() {
        let mut s = session();
        assert_eq!(s.waiting_state(), WaitingState::NoOneWaiting);

        s.set_waiting(WaitingSide::Counselor, true);
        assert_eq!(s.waiting_state(), WaitingState::OneWaiting);

        s.set_waiting(WaitingSide::Student, true);
        assert_eq!(s.waiting_state(), WaitingState::BothWaiting);

        s.call_started_at = Some(Utc::now());
        assert_eq!(s.waiting_state(), WaitingState::InCall);

        s.status = SessionStatus::Completed;
        assert_eq!(s.waiting_state(), WaitingState::Ended);
    }

    #[test]
    fn test_unassigned_counselor_cannot_fill_both_slots() {
        let mut s = session();
        s.counselor_id = None;
        s.counselor_in_waiting_room = true;
        s.student_in_waiting_room = true;
        assert!(!s.both_waiting());
        assert_eq!(s.waiting_state(), WaitingState::OneWaiting);
    }

    #[test]
    fn test_side_of() {
        let s = session();
        let student = Identity::student(UserId(3), StudentId(30), "Sam");
        let counselor = Identity::office_admin(UserId(20), OfficeId(7), "Cora");
        let colleague = Identity::office_admin(UserId(21), OfficeId(7), "Dee");
        let boss = Identity::super_admin(UserId(1), "Root");

        assert_eq!(s.side_of(&student), Some(WaitingSide::Student));
        assert_eq!(s.side_of(&counselor), Some(WaitingSide::Counselor));
        assert_eq!(s.side_of(&colleague), None);
        assert_eq!(s.side_of(&boss), None);
    }

    #[test]
    fn test_no_show_parses_both_spellings() {
        assert_eq!(SessionStatus::parse("no-show"), Some(SessionStatus::NoShow));
        assert_eq!(SessionStatus::parse("no_show"), Some(SessionStatus::NoShow));
    }
}
