//! Message storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{parse_datetime, parse_datetime_opt, parse_message_status, OptionalExt};
use crate::error::Result;
use crate::models::{ConversationId, Message, MessageId, MessageStatus, NewMessage, UserId};

pub struct MessageStore<'a> {
    conn: &'a Connection,
}

impl<'a> MessageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new message with status `sent`
    #[instrument(skip(self, message), fields(conversation_id = %message.conversation_id))]
    pub fn create(&self, message: &NewMessage) -> Result<Message> {
        self.conn.execute(
            "INSERT INTO inquiry_messages (inquiry_id, sender_id, content, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.conversation_id.0,
                message.sender_id.0,
                message.content,
                MessageStatus::Sent.as_str(),
                message.created_at.to_rfc3339(),
            ],
        )?;

        Ok(Message {
            id: MessageId(self.conn.last_insert_rowid()),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            status: MessageStatus::Sent,
            created_at: message.created_at,
            delivered_at: None,
            read_at: None,
        })
    }

    /// Get message by ID
    pub fn find_by_id(&self, id: MessageId) -> Result<Option<Message>> {
        let message = self
            .conn
            .query_row(
                "SELECT id, inquiry_id, sender_id, content, status, created_at, delivered_at, read_at
                 FROM inquiry_messages WHERE id = ?1",
                params![id.0],
                map_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Persist a forward transition.
    ///
    /// The WHERE clause only matches rows still behind the new status, so a
    /// concurrent writer that got there first is never rolled back.
    pub fn save_status(&self, message: &Message) -> Result<bool> {
        let behind: &[&str] = match message.status {
            MessageStatus::Sent => return Ok(false),
            MessageStatus::Delivered => &["sent"],
            MessageStatus::Read => &["sent", "delivered"],
        };

        let updated = self.conn.execute(
            "UPDATE inquiry_messages
             SET status = ?1,
                 delivered_at = COALESCE(delivered_at, ?2),
                 read_at = COALESCE(read_at, ?3)
             WHERE id = ?4 AND status IN (?5, ?6)",
            params![
                message.status.as_str(),
                message.delivered_at.map(|t| t.to_rfc3339()),
                message.read_at.map(|t| t.to_rfc3339()),
                message.id.0,
                behind[0],
                behind[behind.len() - 1],
            ],
        )?;
        Ok(updated > 0)
    }

    /// List messages for a conversation in creation order
    pub fn list_for_conversation(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, inquiry_id, sender_id, content, status, created_at, delivered_at, read_at
             FROM inquiry_messages WHERE inquiry_id = ?1
             ORDER BY created_at, id",
        )?;
        let messages = stmt
            .query_map(params![conversation_id.0], map_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        conversation_id: ConversationId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        content: row.get(3)?,
        status: parse_message_status(&row.get::<_, String>(4)?)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
        delivered_at: parse_datetime_opt(row.get::<_, Option<String>>(6)?)?,
        read_at: parse_datetime_opt(row.get::<_, Option<String>>(7)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, Identity, OfficeId, StudentId};
    use crate::storage::Database;
    use chrono::Utc;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.users()
            .create(&Identity::student(UserId(3), StudentId(30), "Sam"))
            .unwrap();
        db.conversations()
            .create(&Conversation::new(
                ConversationId(42),
                OfficeId(7),
                StudentId(30),
                UserId(3),
            ))
            .unwrap();
        db
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let db = setup();
        let store = db.messages();
        let a = store
            .create(&NewMessage::new(ConversationId(42), UserId(3), "one".into()))
            .unwrap();
        let b = store
            .create(&NewMessage::new(ConversationId(42), UserId(3), "two".into()))
            .unwrap();
        assert!(b.id > a.id);

        let listed = store.list_for_conversation(ConversationId(42)).unwrap();
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }

    #[test]
    fn test_stale_transition_does_not_regress() {
        let db = setup();
        let store = db.messages();
        let created = store
            .create(&NewMessage::new(ConversationId(42), UserId(3), "hi".into()))
            .unwrap();

        let mut read = created.clone();
        read.advance(MessageStatus::Read, Utc::now());
        assert!(store.save_status(&read).unwrap());

        // A delivery ack computed from the stale copy loses the race
        let mut delivered = created;
        delivered.advance(MessageStatus::Delivered, Utc::now());
        assert!(!store.save_status(&delivered).unwrap());

        let stored = store.find_by_id(read.id).unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Read);
        assert_eq!(stored.read_at, read.read_at);
    }
}
