//! Socket event contract
//!
//! One canonical event per state transition. Both directions serialize as
//! `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    ConnectionId, ConversationId, CounselingSession, Message, MessageId, MessageStatus, Role,
    SessionId, SessionStatus, UserId, WaitingState,
};
use crate::rooms::RoomKey;

/// Events a client may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Handshake; must be the first frame on a connection
    Hello { token: String },
    JoinRoom { room: RoomKey },
    LeaveRoom { room: RoomKey },
    Typing {
        conversation_id: ConversationId,
        is_typing: bool,
    },
    SendMessage {
        conversation_id: ConversationId,
        content: String,
    },
    /// A message persisted elsewhere that still needs fan-out
    AnnounceMessage { message_id: MessageId },
    MessageDelivered { message_id: MessageId },
    MessageRead { message_id: MessageId },
    PresenceQuery { user_id: UserId },
    EnterWaitingRoom { session_id: SessionId },
    LeaveWaitingRoom { session_id: SessionId },
    EndCall { session_id: SessionId },
    WaitingRoomStatus { session_id: SessionId },
    WaitingRoomChat { session_id: SessionId, text: String },
    /// Chat to everyone in a session room, not only the call parties
    SessionChat {
        session_id: SessionId,
        content: String,
    },
    SessionStatus {
        session_id: SessionId,
        status: SessionStatus,
    },
    SignalOffer { session_id: SessionId, payload: Value },
    SignalAnswer { session_id: SessionId, payload: Value },
    SignalIce { session_id: SessionId, payload: Value },
}

/// Call negotiation payload kinds relayed between the two parties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Snapshot of a session's waiting room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallUpdate {
    pub session_id: SessionId,
    /// Participant the update is about, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub state: WaitingState,
    pub counselor_waiting: bool,
    pub student_waiting: bool,
    pub call_started: bool,
}

impl CallUpdate {
    pub fn of(session: &CounselingSession, user_id: Option<UserId>) -> Self {
        Self {
            session_id: session.id,
            user_id,
            state: session.waiting_state(),
            counselor_waiting: session.counselor_in_waiting_room,
            student_waiting: session.student_in_waiting_room,
            call_started: session.call_started_at.is_some(),
        }
    }
}

/// A relayed negotiation blob; `payload` is never inspected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub session_id: SessionId,
    pub sender_id: UserId,
    pub payload: Value,
}

/// Events the server emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Welcome {
        connection_id: ConnectionId,
        user_id: UserId,
        rooms: Vec<RoomKey>,
    },
    RoomJoined { room: RoomKey },
    RoomLeft { room: RoomKey },
    PresenceChanged {
        user_id: UserId,
        online: bool,
        timestamp: DateTime<Utc>,
    },
    PresenceStatus {
        user_id: UserId,
        online: bool,
        last_activity: Option<DateTime<Utc>>,
    },
    TypingChanged {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },
    MessageCreated(Message),
    /// Persisted message handed back to its sender
    MessageAck(Message),
    MessageStatusChanged {
        message_id: MessageId,
        conversation_id: ConversationId,
        status: MessageStatus,
        timestamp: DateTime<Utc>,
    },
    ParticipantJoined(CallUpdate),
    ParticipantLeft(CallUpdate),
    CallStarted(CallUpdate),
    CallEnded(CallUpdate),
    WaitingRoomStatus(CallUpdate),
    WaitingRoomChat {
        session_id: SessionId,
        sender_id: UserId,
        sender_name: String,
        text: String,
        timestamp: DateTime<Utc>,
    },
    SessionChatMessage {
        session_id: SessionId,
        sender_id: UserId,
        sender_name: String,
        sender_role: Role,
        content: String,
        timestamp: DateTime<Utc>,
    },
    SessionStatusChanged {
        session_id: SessionId,
        status: SessionStatus,
        updated_by: UserId,
    },
    SignalOffer(Signal),
    SignalAnswer(Signal),
    SignalIce(Signal),
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn signal(kind: SignalKind, signal: Signal) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::SignalOffer(signal),
            SignalKind::Answer => ServerEvent::SignalAnswer(signal),
            SignalKind::IceCandidate => ServerEvent::SignalIce(signal),
        }
    }

    /// Wire name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::RoomJoined { .. } => "room_joined",
            ServerEvent::RoomLeft { .. } => "room_left",
            ServerEvent::PresenceChanged { .. } => "presence_changed",
            ServerEvent::PresenceStatus { .. } => "presence_status",
            ServerEvent::TypingChanged { .. } => "typing_changed",
            ServerEvent::MessageCreated(_) => "message_created",
            ServerEvent::MessageAck(_) => "message_ack",
            ServerEvent::MessageStatusChanged { .. } => "message_status_changed",
            ServerEvent::ParticipantJoined(_) => "participant_joined",
            ServerEvent::ParticipantLeft(_) => "participant_left",
            ServerEvent::CallStarted(_) => "call_started",
            ServerEvent::CallEnded(_) => "call_ended",
            ServerEvent::WaitingRoomStatus(_) => "waiting_room_status",
            ServerEvent::WaitingRoomChat { .. } => "waiting_room_chat",
            ServerEvent::SessionChatMessage { .. } => "session_chat_message",
            ServerEvent::SessionStatusChanged { .. } => "session_status_changed",
            ServerEvent::SignalOffer(_) => "signal_offer",
            ServerEvent::SignalAnswer(_) => "signal_answer",
            ServerEvent::SignalIce(_) => "signal_ice",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_wire_shape() {
        let raw = json!({
            "event": "send_message",
            "data": { "conversation_id": 42, "content": "Where is my form?" }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                conversation_id: ConversationId(42),
                content: "Where is my form?".to_string(),
            }
        );
    }

    #[test]
    fn test_join_room_parses_room_name() {
        let raw = json!({ "event": "join_room", "data": { "room": "conversation:42" } });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                room: RoomKey::Conversation(ConversationId(42))
            }
        );

        let bad = json!({ "event": "join_room", "data": { "room": "inquiry_42" } });
        assert!(serde_json::from_value::<ClientEvent>(bad).is_err());
    }

    #[test]
    fn test_server_event_name_matches_tag() {
        let event = ServerEvent::MessageStatusChanged {
            message_id: MessageId(1),
            conversation_id: ConversationId(42),
            status: MessageStatus::Read,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(value["data"]["status"], "read");
    }

    #[test]
    fn test_signal_payload_is_opaque() {
        let payload = json!({ "sdp": "v=0...", "nested": [1, 2, { "x": null }] });
        let event = ServerEvent::signal(
            SignalKind::IceCandidate,
            Signal {
                session_id: SessionId(9),
                sender_id: UserId(3),
                payload: payload.clone(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "signal_ice");
        assert_eq!(value["data"]["payload"], payload);
    }
}
