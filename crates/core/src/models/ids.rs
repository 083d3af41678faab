//! Typed record identifiers
//!
//! Every persisted record is keyed by the relational store's integer id.
//! Wrapping them keeps a conversation id from being passed where a session
//! id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name)
            }
        }
    };
}

record_id!(
    /// Portal user account
    UserId
);
record_id!(
    /// Counseling/helpdesk office
    OfficeId
);
record_id!(
    /// Student record owned by a student user
    StudentId
);
record_id!(
    /// Inquiry conversation
    ConversationId
);
record_id!(
    /// Chat message within a conversation
    MessageId
);
record_id!(
    /// Scheduled counseling session
    SessionId
);

/// Live socket connection. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
