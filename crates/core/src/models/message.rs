//! Message model for inquiry chat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageId, UserId};

/// Delivery lifecycle, ordered: sent < delivered < read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageStatus {
    Sent = 0,
    Delivered = 1,
    Read = 2,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

/// A chat message in an inquiry conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Move the message forward to `target`.
    ///
    /// Returns false and leaves the message untouched when `target` is not
    /// ahead of the current status. Reading backfills `delivered_at`.
    pub fn advance(&mut self, target: MessageStatus, now: DateTime<Utc>) -> bool {
        if target <= self.status {
            return false;
        }

        match target {
            MessageStatus::Sent => return false,
            MessageStatus::Delivered => {
                self.delivered_at = Some(now);
            }
            MessageStatus::Read => {
                if self.delivered_at.is_none() {
                    self.delivered_at = Some(now);
                }
                self.read_at = Some(now);
            }
        }

        self.status = target;
        true
    }
}

/// A message about to be persisted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(conversation_id: ConversationId, sender_id: UserId, content: String) -> Self {
        Self {
            conversation_id,
            sender_id,
            content,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_message() -> Message {
        Message {
            id: MessageId(1),
            conversation_id: ConversationId(42),
            sender_id: UserId(5),
            content: "hello".to_string(),
            status: MessageStatus::Sent,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    #[test]
    fn test_status_ordering() {
        assert!(MessageStatus::Sent < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Read);
    }

    #[test]
    fn test_read_backfills_delivered() {
        let mut msg = sent_message();
        let now = Utc::now();
        assert!(msg.advance(MessageStatus::Read, now));
        assert_eq!(msg.status, MessageStatus::Read);
        assert_eq!(msg.delivered_at, Some(now));
        assert_eq!(msg.read_at, Some(now));
    }

    #[test]
    fn test_never_regresses() {
        let mut msg = sent_message();
        let first = Utc::now();
        msg.advance(MessageStatus::Read, first);

        let later = first + chrono::Duration::seconds(5);
        assert!(!msg.advance(MessageStatus::Delivered, later));
        assert!(!msg.advance(MessageStatus::Read, later));
        assert_eq!(msg.status, MessageStatus::Read);
        assert_eq!(msg.read_at, Some(first));
    }

    #[test]
    fn test_read_keeps_existing_delivery_time() {
        let mut msg = sent_message();
        let delivered = Utc::now();
        msg.advance(MessageStatus::Delivered, delivered);
        msg.advance(MessageStatus::Read, delivered + chrono::Duration::seconds(2));
        assert_eq!(msg.delivered_at, Some(delivered));
    }
}
