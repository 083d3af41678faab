//! Inquiry conversation storage operations

use rusqlite::{params, Connection};
use tracing::instrument;

use super::parse::{parse_conversation_status, parse_datetime, OptionalExt};
use crate::error::Result;
use crate::models::{Conversation, ConversationId, ConversationStatus, OfficeId, StudentId, UserId};

pub struct ConversationStore<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create an inquiry (CRUD layer)
    #[instrument(skip(self, conversation), fields(conversation_id = %conversation.id))]
    pub fn create(&self, conversation: &Conversation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO inquiries (id, office_id, student_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id.0,
                conversation.office_id.0,
                conversation.student_id.0,
                conversation.status.as_str(),
                conversation.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find inquiry by ID, with the owning student's account
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let conversation = self
            .conn
            .query_row(
                "SELECT i.id, i.office_id, i.student_id, s.user_id, i.status, i.created_at
                 FROM inquiries i
                 INNER JOIN students s ON s.id = i.student_id
                 WHERE i.id = ?1",
                params![id.0],
                |row| {
                    Ok(Conversation {
                        id: ConversationId(row.get(0)?),
                        office_id: OfficeId(row.get(1)?),
                        student_id: StudentId(row.get(2)?),
                        student_user_id: UserId(row.get(3)?),
                        status: parse_conversation_status(&row.get::<_, String>(4)?)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
                    })
                },
            )
            .optional()?;
        Ok(conversation)
    }

    /// Compare-and-set on status
    pub fn transition(
        &self,
        id: ConversationId,
        from: ConversationStatus,
        to: ConversationStatus,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE inquiries SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to.as_str(), id.0, from.as_str()],
        )?;
        Ok(updated > 0)
    }
}
