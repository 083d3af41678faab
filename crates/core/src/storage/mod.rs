//! SQLite storage layer for Guide

mod audit;
mod conversations;
mod messages;
mod migrations;
mod notifications;
mod parse;
mod sessions;
mod traits;
mod users;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::models::{
    AuditEntry, Conversation, ConversationId, ConversationStatus, CounselingSession, Identity,
    Message, MessageId, NewMessage, NewNotification, Notification, OfficeId, SessionId,
    SessionParticipation, SessionStatus, UserId, WaitingSide,
};

pub use audit::AuditStore;
pub use conversations::ConversationStore;
pub use messages::MessageStore;
pub use notifications::NotificationStore;
pub use sessions::SessionStore;
pub use traits::{
    AuditRepository, ConversationRepository, IdentityRepository, LoginLogRepository,
    MessageRepository, NotificationRepository, SessionRepository, Storage, TransactionRepository,
};
pub use users::UserStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(&self.conn)
    }

    pub fn conversations(&self) -> ConversationStore<'_> {
        ConversationStore::new(&self.conn)
    }

    pub fn messages(&self) -> MessageStore<'_> {
        MessageStore::new(&self.conn)
    }

    pub fn sessions(&self) -> SessionStore<'_> {
        SessionStore::new(&self.conn)
    }

    pub fn notifications(&self) -> NotificationStore<'_> {
        NotificationStore::new(&self.conn)
    }

    pub fn audit(&self) -> AuditStore<'_> {
        AuditStore::new(&self.conn)
    }

    /// Raw SQL against the underlying connection, for test setup
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Run `work` inside one store transaction and hand back what it produced.
///
/// Core operations that write more than one row go through here, so a
/// failed write leaves nothing half-applied.
pub fn atomically<S, T, F>(store: &S, work: F) -> Result<T>
where
    S: Storage + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let mut work = Some(work);
    let mut output = None;
    store.in_transaction(&mut || {
        if let Some(work) = work.take() {
            output = Some(work()?);
        }
        Ok(())
    })?;
    output.ok_or_else(|| Error::Validation("transaction produced no result".to_string()))
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl IdentityRepository for Database {
    fn resolve_token(&self, token: &str) -> Result<Option<Identity>> {
        self.users().resolve_token(token)
    }

    fn find_identity(&self, user_id: UserId) -> Result<Option<Identity>> {
        self.users().find_by_id(user_id)
    }

    fn office_admin_ids(&self, office_id: OfficeId) -> Result<Vec<UserId>> {
        self.users().office_admin_ids(office_id)
    }

    fn save_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_activity: DateTime<Utc>,
    ) -> Result<()> {
        self.users().save_presence(user_id, is_online, last_activity)
    }
}

impl ConversationRepository for Database {
    fn find_conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        self.conversations().find_by_id(id)
    }

    fn transition_conversation(
        &self,
        id: ConversationId,
        from: ConversationStatus,
        to: ConversationStatus,
    ) -> Result<bool> {
        self.conversations().transition(id, from, to)
    }
}

impl MessageRepository for Database {
    fn create_message(&self, message: &NewMessage) -> Result<Message> {
        self.messages().create(message)
    }

    fn find_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.messages().find_by_id(id)
    }

    fn save_message_status(&self, message: &Message) -> Result<bool> {
        self.messages().save_status(message)
    }
}

impl SessionRepository for Database {
    fn find_session(&self, id: SessionId) -> Result<Option<CounselingSession>> {
        self.sessions().find_by_id(id)
    }

    fn set_waiting_flag(&self, id: SessionId, side: WaitingSide, waiting: bool) -> Result<()> {
        self.sessions().set_waiting_flag(id, side, waiting)
    }

    fn start_call(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool> {
        self.sessions().start_call(id, at)
    }

    fn clear_call_started(&self, id: SessionId) -> Result<()> {
        self.sessions().clear_call_started(id)
    }

    fn set_session_status(&self, id: SessionId, status: SessionStatus) -> Result<()> {
        self.sessions().set_status(id, status)
    }

    fn open_participation(
        &self,
        id: SessionId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.sessions().open_participation(id, user_id, at)
    }

    fn close_participation(
        &self,
        id: SessionId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.sessions().close_participation(id, user_id, at)
    }

    fn close_all_participations(&self, id: SessionId, at: DateTime<Utc>) -> Result<usize> {
        self.sessions().close_all_participations(id, at)
    }

    fn list_participations(&self, id: SessionId) -> Result<Vec<SessionParticipation>> {
        self.sessions().list_participations(id)
    }
}

impl NotificationRepository for Database {
    fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.notifications().create(notification)
    }

    fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.notifications().list_for_user(user_id)
    }
}

impl AuditRepository for Database {
    fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.audit().record(entry)
    }

    fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.audit().recent(limit)
    }
}

impl TransactionRepository for Database {
    fn in_transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        // Store accessors borrow `self.conn`, so the transaction is taken
        // without a mutable borrow; it rolls back on drop.
        let tx = self.conn.unchecked_transaction()?;
        work()?;
        tx.commit()?;
        Ok(())
    }
}

impl LoginLogRepository for Database {
    fn open_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool> {
        self.users().open_login(user_id, at)
    }

    fn close_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool> {
        self.users().close_login(user_id, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentId;
    use tempfile::tempdir;

    #[test]
    fn test_open_on_disk_runs_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guide.db");

        let db = Database::open(&path).unwrap();
        let version = db.schema_version();
        assert!(version >= 3);
        drop(db);

        // Reopening keeps the same schema
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version(), version);
    }

    #[test]
    fn test_atomically_commits_every_write() {
        let db = Database::open_in_memory().unwrap();
        let id = atomically(&db, || {
            db.users()
                .create(&Identity::student(UserId(3), StudentId(30), "Sam"))?;
            db.users().issue_token("tok-sam", UserId(3))?;
            Ok(UserId(3))
        })
        .unwrap();

        assert_eq!(id, UserId(3));
        assert!(db.resolve_token("tok-sam").unwrap().is_some());
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = atomically(&db, || {
            db.users()
                .create(&Identity::student(UserId(3), StudentId(30), "Sam"))?;
            Err(Error::Validation("stop".to_string()))
        });

        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(db.find_identity(UserId(3)).unwrap().is_none());
    }
}
