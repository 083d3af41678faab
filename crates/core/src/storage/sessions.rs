//! Counseling session and participation storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::instrument;

use super::parse::{parse_datetime, parse_datetime_opt, parse_session_status, OptionalExt};
use crate::error::Result;
use crate::models::{
    CounselingSession, OfficeId, SessionId, SessionParticipation, SessionStatus, StudentId,
    UserId, WaitingSide,
};

pub struct SessionStore<'a> {
    conn: &'a Connection,
}

impl<'a> SessionStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a session (CRUD layer)
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn create(&self, session: &CounselingSession) -> Result<()> {
        self.conn.execute(
            "INSERT INTO counseling_sessions (
                id, student_id, counselor_id, office_id, scheduled_at, status, is_video,
                counselor_in_waiting_room, student_in_waiting_room, call_started_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.id.0,
                session.student_id.0,
                session.counselor_id.map(|id| id.0),
                session.office_id.0,
                session.scheduled_at.to_rfc3339(),
                session.status.as_str(),
                session.is_video as i32,
                session.counselor_in_waiting_room as i32,
                session.student_in_waiting_room as i32,
                session.call_started_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Find session by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: SessionId) -> Result<Option<CounselingSession>> {
        let session = self
            .conn
            .query_row(
                "SELECT c.id, c.student_id, s.user_id, c.counselor_id, c.office_id,
                        c.scheduled_at, c.status, c.is_video,
                        c.counselor_in_waiting_room, c.student_in_waiting_room, c.call_started_at
                 FROM counseling_sessions c
                 INNER JOIN students s ON s.id = c.student_id
                 WHERE c.id = ?1",
                params![id.0],
                |row| {
                    Ok(CounselingSession {
                        id: SessionId(row.get(0)?),
                        student_id: StudentId(row.get(1)?),
                        student_user_id: UserId(row.get(2)?),
                        counselor_id: row.get::<_, Option<i64>>(3)?.map(UserId),
                        office_id: OfficeId(row.get(4)?),
                        scheduled_at: parse_datetime(&row.get::<_, String>(5)?)?,
                        status: parse_session_status(&row.get::<_, String>(6)?)?,
                        is_video: row.get::<_, i32>(7)? != 0,
                        counselor_in_waiting_room: row.get::<_, i32>(8)? != 0,
                        student_in_waiting_room: row.get::<_, i32>(9)? != 0,
                        call_started_at: parse_datetime_opt(row.get::<_, Option<String>>(10)?)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn set_waiting_flag(&self, id: SessionId, side: WaitingSide, waiting: bool) -> Result<()> {
        let sql = match side {
            WaitingSide::Counselor => {
                "UPDATE counseling_sessions SET counselor_in_waiting_room = ?1 WHERE id = ?2"
            }
            WaitingSide::Student => {
                "UPDATE counseling_sessions SET student_in_waiting_room = ?1 WHERE id = ?2"
            }
        };
        self.conn.execute(sql, params![waiting as i32, id.0])?;
        Ok(())
    }

    /// Stamp the call start if both parties are waiting and nobody stamped it yet
    pub fn start_call(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE counseling_sessions SET call_started_at = ?1
             WHERE id = ?2
               AND call_started_at IS NULL
               AND counselor_id IS NOT NULL
               AND counselor_in_waiting_room = 1
               AND student_in_waiting_room = 1",
            params![at.to_rfc3339(), id.0],
        )?;
        Ok(updated > 0)
    }

    pub fn clear_call_started(&self, id: SessionId) -> Result<()> {
        self.conn.execute(
            "UPDATE counseling_sessions SET call_started_at = NULL WHERE id = ?1",
            params![id.0],
        )?;
        Ok(())
    }

    pub fn set_status(&self, id: SessionId, status: SessionStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE counseling_sessions SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.0],
        )?;
        Ok(())
    }

    /// Open a participation row unless one is already open for this user
    pub fn open_participation(
        &self,
        id: SessionId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO session_participations (session_id, user_id, joined_at)
             SELECT ?1, ?2, ?3
             WHERE NOT EXISTS (
                SELECT 1 FROM session_participations
                WHERE session_id = ?1 AND user_id = ?2 AND left_at IS NULL
             )",
            params![id.0, user_id.0, at.to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    pub fn close_participation(
        &self,
        id: SessionId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE session_participations SET left_at = ?1
             WHERE session_id = ?2 AND user_id = ?3 AND left_at IS NULL",
            params![at.to_rfc3339(), id.0, user_id.0],
        )?;
        Ok(updated > 0)
    }

    pub fn close_all_participations(&self, id: SessionId, at: DateTime<Utc>) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE session_participations SET left_at = ?1
             WHERE session_id = ?2 AND left_at IS NULL",
            params![at.to_rfc3339(), id.0],
        )?;
        Ok(updated)
    }

    pub fn list_participations(&self, id: SessionId) -> Result<Vec<SessionParticipation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, user_id, joined_at, left_at
             FROM session_participations WHERE session_id = ?1
             ORDER BY joined_at, id",
        )?;
        let rows = stmt
            .query_map(params![id.0], |row| {
                Ok(SessionParticipation {
                    id: row.get(0)?,
                    session_id: SessionId(row.get(1)?),
                    user_id: UserId(row.get(2)?),
                    joined_at: parse_datetime(&row.get::<_, String>(3)?)?,
                    left_at: parse_datetime_opt(row.get::<_, Option<String>>(4)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
