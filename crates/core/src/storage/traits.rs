//! Storage repository traits
//!
//! These traits are the only contract between the realtime core and the
//! portal's relational store. The SQLite `Database` implements all of them;
//! tests and alternative backends can substitute their own.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    AuditEntry, Conversation, ConversationId, ConversationStatus, CounselingSession, Identity,
    Message, MessageId, NewMessage, NewNotification, Notification, OfficeId, SessionId,
    SessionParticipation, SessionStatus, UserId, WaitingSide,
};

/// Identity and directory lookups, plus the presence write-back
pub trait IdentityRepository {
    /// Resolve an access token presented at handshake
    fn resolve_token(&self, token: &str) -> Result<Option<Identity>>;

    /// Find identity by user ID
    fn find_identity(&self, user_id: UserId) -> Result<Option<Identity>>;

    /// Users administering an office
    fn office_admin_ids(&self, office_id: OfficeId) -> Result<Vec<UserId>>;

    /// Persist online flag and last activity
    fn save_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_activity: DateTime<Utc>,
    ) -> Result<()>;
}

/// Inquiry conversation operations
pub trait ConversationRepository {
    /// Find conversation by ID
    fn find_conversation(&self, id: ConversationId) -> Result<Option<Conversation>>;

    /// Change status only if it currently equals `from`.
    /// Returns whether the row changed.
    fn transition_conversation(
        &self,
        id: ConversationId,
        from: ConversationStatus,
        to: ConversationStatus,
    ) -> Result<bool>;
}

/// Chat message operations
pub trait MessageRepository {
    /// Persist a new message with status `sent`
    fn create_message(&self, message: &NewMessage) -> Result<Message>;

    /// Find message by ID
    fn find_message(&self, id: MessageId) -> Result<Option<Message>>;

    /// Persist a forward status transition.
    /// Rows already at or beyond the message's status are left untouched;
    /// returns whether the row changed.
    fn save_message_status(&self, message: &Message) -> Result<bool>;
}

/// Counseling session and participation operations
pub trait SessionRepository {
    /// Find session by ID
    fn find_session(&self, id: SessionId) -> Result<Option<CounselingSession>>;

    /// Set one waiting-room flag
    fn set_waiting_flag(&self, id: SessionId, side: WaitingSide, waiting: bool) -> Result<()>;

    /// Stamp `call_started_at` if both flags are set and it is still empty.
    /// Returns whether this call did the stamping.
    fn start_call(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool>;

    /// Clear `call_started_at`
    fn clear_call_started(&self, id: SessionId) -> Result<()>;

    /// Update scheduling status
    fn set_session_status(&self, id: SessionId, status: SessionStatus) -> Result<()>;

    /// Open a participation row unless one is already open.
    /// Returns whether a row was created.
    fn open_participation(&self, id: SessionId, user_id: UserId, at: DateTime<Utc>)
        -> Result<bool>;

    /// Close the user's open participation row, if any
    fn close_participation(
        &self,
        id: SessionId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Close every open participation row of the session
    fn close_all_participations(&self, id: SessionId, at: DateTime<Utc>) -> Result<usize>;

    /// List participation rows, oldest first
    fn list_participations(&self, id: SessionId) -> Result<Vec<SessionParticipation>>;
}

/// Durable per-user inbox
pub trait NotificationRepository {
    /// Create a notification
    fn create_notification(&self, notification: &NewNotification) -> Result<Notification>;

    /// List notifications for a user, newest first
    fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>>;
}

/// Action log
pub trait AuditRepository {
    /// Record an audit entry
    fn record_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Most recent entries, newest first
    fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>>;
}

/// Login/logout bookkeeping
pub trait LoginLogRepository {
    /// Open a login row unless one is already open
    fn open_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool>;

    /// Set the logout time on the newest open login row
    fn close_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool>;
}

/// Grouping of writes into one atomic unit
pub trait TransactionRepository {
    /// Run `work` so that either every write it makes lands or none does.
    /// An error from `work` rolls the unit back and is returned as is.
    fn in_transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
pub trait Storage:
    IdentityRepository
    + ConversationRepository
    + MessageRepository
    + SessionRepository
    + NotificationRepository
    + AuditRepository
    + LoginLogRepository
    + TransactionRepository
{
}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: IdentityRepository
        + ConversationRepository
        + MessageRepository
        + SessionRepository
        + NotificationRepository
        + AuditRepository
        + LoginLogRepository
        + TransactionRepository
{
}
