//! Inquiry conversation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, OfficeId, StudentId, UserId};

/// Inquiry lifecycle as tracked by the helpdesk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Pending => "pending",
            ConversationStatus::InProgress => "in_progress",
            ConversationStatus::Resolved => "resolved",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ConversationStatus::Pending),
            "in_progress" => Some(ConversationStatus::InProgress),
            "resolved" => Some(ConversationStatus::Resolved),
            "closed" => Some(ConversationStatus::Closed),
            _ => None,
        }
    }
}

/// A student's inquiry addressed to one office
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub office_id: OfficeId,
    pub student_id: StudentId,
    /// Account of the student who owns `student_id`
    pub student_user_id: UserId,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        office_id: OfficeId,
        student_id: StudentId,
        student_user_id: UserId,
    ) -> Self {
        Self {
            id,
            office_id,
            student_id,
            student_user_id,
            status: ConversationStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
