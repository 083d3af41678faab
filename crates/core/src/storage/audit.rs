//! Audit log storage

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{AuditEntry, UserId};

pub struct AuditStore<'a> {
    conn: &'a Connection,
}

impl<'a> AuditStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn record(&self, entry: &AuditEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audit_logs (actor_id, action, target_type, target_id, is_success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.actor_id.map(|id| id.0),
                entry.action,
                entry.target_type,
                entry.target_id,
                entry.is_success as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT actor_id, action, target_type, target_id, is_success
             FROM audit_logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(AuditEntry {
                    actor_id: row.get::<_, Option<i64>>(0)?.map(UserId),
                    action: row.get(1)?,
                    target_type: row.get(2)?,
                    target_id: row.get(3)?,
                    is_success: row.get::<_, i32>(4)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_record_and_read_back_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.audit()
            .record(&AuditEntry::new(UserId(1), "first", "system"))
            .unwrap();
        db.audit()
            .record(&AuditEntry::new(UserId(1), "second", "counseling_session").target(9).failed())
            .unwrap();

        let entries = db.audit().recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "second");
        assert_eq!(entries[0].target_id, Some(9));
        assert!(!entries[0].is_success);
    }
}
