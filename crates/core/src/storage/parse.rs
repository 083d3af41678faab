//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;

use crate::models::{ConversationStatus, MessageStatus, Role, SessionStatus};

fn conversion_error(column: usize, detail: String) -> SqlError {
    SqlError::FromSqlConversionFailure(
        column,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, detail)),
    )
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

pub fn parse_role(s: &str) -> Result<Role, SqlError> {
    Role::parse(s).ok_or_else(|| conversion_error(0, format!("unknown role '{}'", s)))
}

pub fn parse_conversation_status(s: &str) -> Result<ConversationStatus, SqlError> {
    ConversationStatus::parse(s)
        .ok_or_else(|| conversion_error(0, format!("unknown inquiry status '{}'", s)))
}

pub fn parse_message_status(s: &str) -> Result<MessageStatus, SqlError> {
    MessageStatus::parse(s)
        .ok_or_else(|| conversion_error(0, format!("unknown message status '{}'", s)))
}

pub fn parse_session_status(s: &str) -> Result<SessionStatus, SqlError> {
    SessionStatus::parse(s)
        .ok_or_else(|| conversion_error(0, format!("unknown session status '{}'", s)))
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_roundtrip() {
        let now = Utc::now();
        assert_eq!(parse_datetime(&now.to_rfc3339()).unwrap(), now);
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_unknown_enum_values_are_errors() {
        assert!(parse_role("janitor").is_err());
        assert!(parse_message_status("seen").is_err());
        assert_eq!(parse_session_status("no-show").unwrap(), SessionStatus::NoShow);
    }
}
