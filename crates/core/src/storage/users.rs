//! Identity storage operations
//!
//! Accounts are created by the portal's CRUD layer; the realtime core only
//! reads them and writes back presence. `create` and `issue_token` exist for
//! that layer and for tests.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{parse_datetime_opt, parse_role, OptionalExt};
use crate::error::Result;
use crate::models::{Identity, OfficeId, StudentId, UserId};

const IDENTITY_COLUMNS: &str =
    "u.id, u.display_name, u.role, u.office_id, s.id, u.is_online, u.last_activity
     FROM users u LEFT JOIN students s ON s.user_id = u.id";

pub struct UserStore<'a> {
    conn: &'a Connection,
}

impl<'a> UserStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a user, plus its student record for students
    #[instrument(skip(self, identity), fields(user_id = %identity.id, role = %identity.role))]
    pub fn create(&self, identity: &Identity) -> Result<()> {
        self.conn.execute(
            "INSERT INTO users (id, display_name, role, office_id, is_online, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                identity.id.0,
                identity.display_name,
                identity.role.as_str(),
                identity.office_id.map(|id| id.0),
                identity.is_online as i32,
                identity.last_activity.map(|t| t.to_rfc3339()),
            ],
        )?;

        if let Some(student_id) = identity.student_id {
            self.conn.execute(
                "INSERT INTO students (id, user_id) VALUES (?1, ?2)",
                params![student_id.0, identity.id.0],
            )?;
        }
        Ok(())
    }

    /// Issue a handshake token for a user
    pub fn issue_token(&self, token: &str, user_id: UserId) -> Result<()> {
        self.conn.execute(
            "INSERT INTO access_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user_id.0, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Find identity by user ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, user_id: UserId) -> Result<Option<Identity>> {
        let sql = format!("SELECT {} WHERE u.id = ?1", IDENTITY_COLUMNS);
        let identity = self
            .conn
            .query_row(&sql, params![user_id.0], map_identity)
            .optional()?;
        Ok(identity)
    }

    /// Resolve a handshake token
    #[instrument(skip(self, token))]
    pub fn resolve_token(&self, token: &str) -> Result<Option<Identity>> {
        let sql = format!(
            "SELECT {} INNER JOIN access_tokens t ON t.user_id = u.id WHERE t.token = ?1",
            IDENTITY_COLUMNS
        );
        let identity = self
            .conn
            .query_row(&sql, params![token], map_identity)
            .optional()?;
        Ok(identity)
    }

    /// Users administering an office
    pub fn office_admin_ids(&self, office_id: OfficeId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM users WHERE role = 'office_admin' AND office_id = ?1 ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![office_id.0], |row| row.get::<_, i64>(0).map(UserId))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Write back presence
    pub fn save_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_activity: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET is_online = ?1, last_activity = ?2 WHERE id = ?3",
            params![is_online as i32, last_activity.to_rfc3339(), user_id.0],
        )?;
        Ok(())
    }

    /// Open a login row unless one is already open
    pub fn open_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO login_logs (user_id, login_time)
             SELECT ?1, ?2
             WHERE NOT EXISTS (
                SELECT 1 FROM login_logs WHERE user_id = ?1 AND logout_time IS NULL
             )",
            params![user_id.0, at.to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// Close the newest open login row
    pub fn close_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE login_logs SET logout_time = ?1
             WHERE id = (
                SELECT id FROM login_logs
                WHERE user_id = ?2 AND logout_time IS NULL
                ORDER BY login_time DESC, id DESC
                LIMIT 1
             )",
            params![at.to_rfc3339(), user_id.0],
        )?;
        Ok(updated > 0)
    }

    /// Count of open login rows (diagnostics)
    pub fn open_login_count(&self, user_id: UserId) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM login_logs WHERE user_id = ?1 AND logout_time IS NULL",
            params![user_id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_identity(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: UserId(row.get(0)?),
        display_name: row.get(1)?,
        role: parse_role(&row.get::<_, String>(2)?)?,
        office_id: row.get::<_, Option<i64>>(3)?.map(OfficeId),
        student_id: row.get::<_, Option<i64>>(4)?.map(StudentId),
        is_online: row.get::<_, i32>(5)? != 0,
        last_activity: parse_datetime_opt(row.get::<_, Option<String>>(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_create_and_find_student() {
        let db = Database::open_in_memory().unwrap();
        let sam = Identity::student(UserId(3), StudentId(30), "Sam");
        db.users().create(&sam).unwrap();

        let found = db.users().find_by_id(UserId(3)).unwrap().unwrap();
        assert_eq!(found.student_id, Some(StudentId(30)));
        assert_eq!(found.office_id, None);
        assert!(!found.is_online);
    }

    #[test]
    fn test_resolve_token() {
        let db = Database::open_in_memory().unwrap();
        let ana = Identity::office_admin(UserId(4), OfficeId(7), "Ana");
        db.users().create(&ana).unwrap();
        db.users().issue_token("tok-ana", UserId(4)).unwrap();

        let resolved = db.users().resolve_token("tok-ana").unwrap().unwrap();
        assert_eq!(resolved.id, UserId(4));
        assert_eq!(resolved.office_id, Some(OfficeId(7)));
        assert!(db.users().resolve_token("nope").unwrap().is_none());
    }

    #[test]
    fn test_office_admin_ids() {
        let db = Database::open_in_memory().unwrap();
        db.users()
            .create(&Identity::office_admin(UserId(5), OfficeId(7), "B"))
            .unwrap();
        db.users()
            .create(&Identity::office_admin(UserId(4), OfficeId(7), "A"))
            .unwrap();
        db.users()
            .create(&Identity::office_admin(UserId(6), OfficeId(8), "C"))
            .unwrap();

        let ids = db.users().office_admin_ids(OfficeId(7)).unwrap();
        assert_eq!(ids, vec![UserId(4), UserId(5)]);
    }

    #[test]
    fn test_login_log_single_open_row() {
        let db = Database::open_in_memory().unwrap();
        db.users()
            .create(&Identity::office_admin(UserId(4), OfficeId(7), "Ana"))
            .unwrap();

        let now = Utc::now();
        assert!(db.users().open_login(UserId(4), now).unwrap());
        assert!(!db.users().open_login(UserId(4), now).unwrap());
        assert_eq!(db.users().open_login_count(UserId(4)).unwrap(), 1);

        assert!(db.users().close_login(UserId(4), now).unwrap());
        assert!(!db.users().close_login(UserId(4), now).unwrap());
        assert_eq!(db.users().open_login_count(UserId(4)).unwrap(), 0);
    }
}
