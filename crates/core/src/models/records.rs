//! Write-mostly records: participation, notifications, audit, login logs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SessionId, UserId};

/// One stretch of a user's presence in a session's call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParticipation {
    pub id: i64,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl SessionParticipation {
    pub fn is_open(&self) -> bool {
        self.left_at.is_none()
    }
}

/// A notification headed for a user's inbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: UserId,
    pub title: String,
    pub message: String,
}

impl NewNotification {
    pub fn new(recipient_id: UserId, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient_id,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// A persisted inbox notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: UserId,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A significant action worth keeping in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: Option<UserId>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub is_success: bool,
}

impl AuditEntry {
    pub fn new(actor_id: UserId, action: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id),
            action: action.into(),
            target_type: target_type.into(),
            target_id: None,
            is_success: true,
        }
    }

    pub fn target(mut self, id: i64) -> Self {
        self.target_id = Some(id);
        self
    }

    pub fn failed(mut self) -> Self {
        self.is_success = false;
        self
    }
}

/// Login/logout bookkeeping for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLog {
    pub id: i64,
    pub user_id: UserId,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
}
