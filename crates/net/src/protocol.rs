//! Inbound event decoding
//!
//! Clients send `{"event": <name>, "data": {...}}`. Older portal pages still
//! speak the older event names and room spellings; those are rewritten to
//! the canonical form here, before anything reaches the core.

use serde_json::{Map, Value};
use tracing::debug;

use guide_core::ClientEvent;

use crate::error::{Error, Result};

/// Decode one inbound frame payload into a canonical client event
pub fn decode_client_event(payload: &[u8]) -> Result<ClientEvent> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::Protocol(format!("Invalid JSON: {}", e)))?;
    let value = upgrade_legacy(value)?;
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("Invalid event: {}", e)))
}

/// Canonical spelling of a room name sent by an older client
pub fn legacy_room_name(name: &str) -> Option<String> {
    if name == "admin_room" {
        return Some("admin".to_string());
    }
    let (prefix, id) = name.rsplit_once('_')?;
    let id: i64 = id.parse().ok()?;
    let kind = match prefix {
        "user" | "student" => "user",
        "office" => "office",
        "inquiry" => "conversation",
        "counseling" => "session",
        "video_call" => "call",
        _ => return None,
    };
    Some(format!("{}:{}", kind, id))
}

fn rename_field(data: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = data.remove(from) {
        data.insert(to.to_string(), value);
    }
}

fn upgrade_room(data: &mut Map<String, Value>) {
    let upgraded = data
        .get("room")
        .and_then(Value::as_str)
        .and_then(legacy_room_name);
    if let Some(room) = upgraded {
        data.insert("room".to_string(), Value::String(room));
    }
}

/// `{session_id: N}` becomes `{room: "session:N"}`
fn session_room(data: &mut Map<String, Value>) -> Result<()> {
    let id = match data.remove("session_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::Protocol("Missing session_id".into()))?;
    data.insert("room".to_string(), Value::String(format!("session:{}", id)));
    Ok(())
}

fn upgrade_legacy(mut value: Value) -> Result<Value> {
    let envelope = value
        .as_object_mut()
        .ok_or_else(|| Error::Protocol("Event must be a JSON object".into()))?;
    let name = envelope
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("Missing event name".into()))?
        .to_string();

    let mut data = match envelope.remove("data") {
        Some(Value::Object(data)) => data,
        Some(Value::Null) | None => Map::new(),
        Some(_) => return Err(Error::Protocol("Event data must be an object".into())),
    };

    let canonical = match name.as_str() {
        "join" => {
            upgrade_room(&mut data);
            "join_room"
        }
        "leave" => {
            upgrade_room(&mut data);
            "leave_room"
        }
        "join_counseling_room" => {
            session_room(&mut data)?;
            "join_room"
        }
        "leave_counseling_room" => {
            session_room(&mut data)?;
            "leave_room"
        }
        "join_room" | "leave_room" => {
            upgrade_room(&mut data);
            name.as_str()
        }
        "typing_indicator" => {
            rename_field(&mut data, "inquiry_id", "conversation_id");
            data.entry("is_typing").or_insert(Value::Bool(false));
            "typing"
        }
        "chat_message_delivered" => "message_delivered",
        "chat_message_read" => "message_read",
        "message_status" => match data.remove("status").as_ref().and_then(Value::as_str) {
            Some("delivered") => "message_delivered",
            Some("read") => "message_read",
            _ => return Err(Error::Protocol("Unknown message status".into())),
        },
        "new_message_notification" | "chat_message_sent" => "announce_message",
        "join_call" => "enter_waiting_room",
        "leave_call" => "leave_waiting_room",
        "video_offer" => {
            rename_field(&mut data, "sdp", "payload");
            "signal_offer"
        }
        "video_answer" => {
            rename_field(&mut data, "sdp", "payload");
            "signal_answer"
        }
        "ice_candidate" => {
            rename_field(&mut data, "candidate", "payload");
            "signal_ice"
        }
        "waiting_room_message" => {
            rename_field(&mut data, "message", "text");
            "waiting_room_chat"
        }
        "check_waiting_room_status" => "waiting_room_status",
        "counseling_status_update" => "session_status",
        "counseling_message" => "session_chat",
        other => other,
    }
    .to_string();

    if canonical != name {
        debug!(legacy = %name, canonical = %canonical, "Upgraded legacy event");
    }

    envelope.insert("event".to_string(), Value::String(canonical));
    envelope.insert("data".to_string(), Value::Object(data));
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guide_core::{ConversationId, MessageId, RoomKey, SessionId, SessionStatus};
    use serde_json::json;

    fn decode(value: Value) -> Result<ClientEvent> {
        decode_client_event(&serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_canonical_events_pass_through() {
        let event = decode(json!({
            "event": "message_read",
            "data": { "message_id": 5 }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageRead {
                message_id: MessageId(5)
            }
        );
    }

    #[test]
    fn test_legacy_join_with_old_room_name() {
        let event = decode(json!({ "event": "join", "data": { "room": "inquiry_42" } })).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                room: RoomKey::Conversation(ConversationId(42))
            }
        );

        let event = decode(json!({ "event": "join", "data": { "room": "admin_room" } })).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom { room: RoomKey::Admin });
    }

    #[test]
    fn test_legacy_typing_and_receipts() {
        let event = decode(json!({
            "event": "typing_indicator",
            "data": { "inquiry_id": 42, "office_id": 7 }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Typing {
                conversation_id: ConversationId(42),
                is_typing: false
            }
        );

        let event = decode(json!({
            "event": "chat_message_delivered",
            "data": { "inquiry_id": 42, "message_id": 8, "sender_id": 3 }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageDelivered {
                message_id: MessageId(8)
            }
        );
    }

    #[test]
    fn test_legacy_call_events() {
        let event = decode(json!({ "event": "join_call", "data": { "session_id": 9 } })).unwrap();
        assert_eq!(
            event,
            ClientEvent::EnterWaitingRoom {
                session_id: SessionId(9)
            }
        );

        let candidate = json!({ "candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 54321 typ host" });
        let event = decode(json!({
            "event": "ice_candidate",
            "data": { "session_id": 9, "candidate": candidate }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SignalIce {
                session_id: SessionId(9),
                payload: candidate
            }
        );

        let event = decode(json!({
            "event": "counseling_status_update",
            "data": { "session_id": 9, "status": "no-show" }
        }));
        // Only the canonical spelling is accepted on the wire
        assert!(event.is_err());

        let event = decode(json!({
            "event": "counseling_status_update",
            "data": { "session_id": 9, "status": "cancelled" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SessionStatus {
                session_id: SessionId(9),
                status: SessionStatus::Cancelled
            }
        );
    }

    #[test]
    fn test_legacy_receipts_and_announcements() {
        let event = decode(json!({
            "event": "message_status",
            "data": { "message_id": 8, "status": "read" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageRead {
                message_id: MessageId(8)
            }
        );

        let event = decode(json!({
            "event": "message_status",
            "data": { "message_id": 8, "status": "delivered" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageDelivered {
                message_id: MessageId(8)
            }
        );

        assert!(decode(json!({
            "event": "message_status",
            "data": { "message_id": 8, "status": "seen" }
        }))
        .is_err());

        let event = decode(json!({
            "event": "chat_message_sent",
            "data": { "message_id": 8, "inquiry_id": 42 }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::AnnounceMessage {
                message_id: MessageId(8)
            }
        );
    }

    #[test]
    fn test_legacy_counseling_room_events() {
        let event = decode(json!({
            "event": "join_counseling_room",
            "data": { "session_id": 9 }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                room: RoomKey::Session(SessionId(9))
            }
        );

        let event = decode(json!({
            "event": "leave_counseling_room",
            "data": { "session_id": "9" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::LeaveRoom {
                room: RoomKey::Session(SessionId(9))
            }
        );

        assert!(decode(json!({ "event": "join_counseling_room", "data": {} })).is_err());

        let event = decode(json!({
            "event": "counseling_message",
            "data": { "session_id": 9, "content": "See you at three" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SessionChat {
                session_id: SessionId(9),
                content: "See you at three".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_input() {
        assert!(decode_client_event(b"not json").is_err());
        assert!(decode(json!(["send_message"])).is_err());
        assert!(decode(json!({ "data": {} })).is_err());
        assert!(decode(json!({ "event": "shout", "data": {} })).is_err());
        assert!(decode(json!({ "event": "send_message", "data": "hello" })).is_err());
    }

    #[test]
    fn test_legacy_room_names() {
        assert_eq!(legacy_room_name("user_3").as_deref(), Some("user:3"));
        assert_eq!(legacy_room_name("student_3").as_deref(), Some("user:3"));
        assert_eq!(legacy_room_name("video_call_9").as_deref(), Some("call:9"));
        assert_eq!(legacy_room_name("counseling_9").as_deref(), Some("session:9"));
        assert_eq!(legacy_room_name("office_x"), None);
        assert_eq!(legacy_room_name("conversation:42"), None);
    }
}
