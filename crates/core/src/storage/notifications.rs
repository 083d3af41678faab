//! Notification inbox storage

use chrono::Utc;
use rusqlite::{params, Connection};

use super::parse::parse_datetime;
use crate::error::Result;
use crate::models::{NewNotification, Notification, UserId};

pub struct NotificationStore<'a> {
    conn: &'a Connection,
}

impl<'a> NotificationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, notification: &NewNotification) -> Result<Notification> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO notifications (user_id, title, message, is_read, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![
                notification.recipient_id.0,
                notification.title,
                notification.message,
                created_at.to_rfc3339(),
            ],
        )?;

        Ok(Notification {
            id: self.conn.last_insert_rowid(),
            recipient_id: notification.recipient_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            is_read: false,
            created_at,
        })
    }

    pub fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, message, is_read, created_at
             FROM notifications WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id.0], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    recipient_id: UserId(row.get(1)?),
                    title: row.get(2)?,
                    message: row.get(3)?,
                    is_read: row.get::<_, i32>(4)? != 0,
                    created_at: parse_datetime(&row.get::<_, String>(5)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
