//! Message delivery pipeline
//!
//! Creates inquiry messages, moves them through sent → delivered → read,
//! and fans them out. Fan-out is pub/sub: rooms with nobody in them drop the
//! event, and the inbox notification written for the counterpart is what an
//! offline recipient sees later.

use chrono::Utc;
use tracing::{debug, info};

use crate::effects::{Effect, Effects};
use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::models::{
    Conversation, ConversationId, ConversationStatus, Identity, Message, MessageId,
    MessageStatus, NewMessage, NewNotification, Role, UserId,
};
use crate::permissions::can_access_conversation;
use crate::rooms::{room_for_conversation, room_for_office, room_for_user, RoomKey};
use crate::storage::{atomically, Storage};

const PREVIEW_CHARS: usize = 100;

fn load_conversation<S: Storage + ?Sized>(
    store: &S,
    id: ConversationId,
) -> Result<Conversation> {
    store
        .find_conversation(id)?
        .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))
}

fn ensure_party(identity: &Identity, conversation: &Conversation) -> Result<()> {
    if can_access_conversation(identity, conversation) {
        Ok(())
    } else {
        Err(Error::AuthorizationDenied(format!(
            "user {} is not party to conversation {}",
            identity.id, conversation.id
        )))
    }
}

/// Personal or office room of whoever is on the other side from `sender`
fn counterpart_room(sender: &Identity, conversation: &Conversation) -> RoomKey {
    match sender.role {
        Role::Student => room_for_office(conversation.office_id),
        _ => room_for_user(conversation.student_user_id),
    }
}

fn counterpart_users<S: Storage + ?Sized>(
    store: &S,
    sender: &Identity,
    conversation: &Conversation,
) -> Result<Vec<UserId>> {
    match sender.role {
        Role::Student => store.office_admin_ids(conversation.office_id),
        _ => Ok(vec![conversation.student_user_id]),
    }
}

fn preview(content: &str) -> String {
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}

/// First reply on a pending inquiry takes it off the queue. The store only
/// flips rows that are still pending, so this happens once per conversation.
fn unblock_queue<S: Storage + ?Sized>(store: &S, conversation: &Conversation) -> Result<()> {
    if conversation.status != ConversationStatus::Pending {
        return Ok(());
    }
    let moved = store.transition_conversation(
        conversation.id,
        ConversationStatus::Pending,
        ConversationStatus::InProgress,
    )?;
    if moved {
        info!(conversation_id = %conversation.id, "Conversation moved to in_progress");
    }
    Ok(())
}

fn fan_out<S: Storage + ?Sized>(
    store: &S,
    sender: &Identity,
    conversation: &Conversation,
    message: &Message,
) -> Result<Effects> {
    let mut effects = vec![Effect::emit_to(
        vec![
            room_for_conversation(conversation.id),
            counterpart_room(sender, conversation),
        ],
        ServerEvent::MessageCreated(message.clone()),
    )];

    let title = format!("New message from {}", sender.display_name);
    for recipient in counterpart_users(store, sender, conversation)? {
        effects.push(Effect::Notify(NewNotification::new(
            recipient,
            title.clone(),
            preview(&message.content),
        )));
    }
    Ok(effects)
}

/// Persist and fan out a new chat message.
///
/// The sender gets the stored message back as `message_ack`.
pub fn send<S: Storage + ?Sized>(
    store: &S,
    sender: &Identity,
    conversation_id: ConversationId,
    content: &str,
) -> Result<Effects> {
    if content.trim().is_empty() {
        return Err(Error::Validation("message content is empty".to_string()));
    }
    let conversation = load_conversation(store, conversation_id)?;
    ensure_party(sender, &conversation)?;

    let message = atomically(store, || {
        let message = store.create_message(&NewMessage::new(
            conversation_id,
            sender.id,
            content.to_string(),
        ))?;
        unblock_queue(store, &conversation)?;
        Ok(message)
    })?;
    debug!(message_id = %message.id, conversation_id = %conversation_id, "Message stored");

    let mut effects = fan_out(store, sender, &conversation, &message)?;
    effects.push(Effect::Reply(ServerEvent::MessageAck(message)));
    Ok(effects)
}

/// Fan out a message the portal already stored through its own form
pub fn announce<S: Storage + ?Sized>(
    store: &S,
    sender: &Identity,
    message_id: MessageId,
) -> Result<Effects> {
    let message = store
        .find_message(message_id)?
        .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))?;
    if message.sender_id != sender.id {
        return Err(Error::AuthorizationDenied(format!(
            "user {} did not send message {}",
            sender.id, message_id
        )));
    }
    let conversation = load_conversation(store, message.conversation_id)?;
    ensure_party(sender, &conversation)?;

    atomically(store, || unblock_queue(store, &conversation))?;
    fan_out(store, sender, &conversation, &message)
}

fn acknowledge<S: Storage + ?Sized>(
    store: &S,
    acker: &Identity,
    message_id: MessageId,
    target: MessageStatus,
) -> Result<Effects> {
    let mut message = store
        .find_message(message_id)?
        .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))?;
    let conversation = load_conversation(store, message.conversation_id)?;
    if message.sender_id == acker.id || !can_access_conversation(acker, &conversation) {
        return Err(Error::AuthorizationDenied(format!(
            "user {} is not a recipient of message {}",
            acker.id, message_id
        )));
    }

    let now = Utc::now();
    if !message.advance(target, now) {
        return Ok(Vec::new());
    }
    if !store.save_message_status(&message)? {
        // Another connection moved it at least this far already
        return Ok(Vec::new());
    }

    Ok(vec![Effect::emit(
        room_for_user(message.sender_id),
        ServerEvent::MessageStatusChanged {
            message_id,
            conversation_id: message.conversation_id,
            status: target,
            timestamp: now,
        },
    )])
}

pub fn mark_delivered<S: Storage + ?Sized>(
    store: &S,
    acker: &Identity,
    message_id: MessageId,
) -> Result<Effects> {
    acknowledge(store, acker, message_id, MessageStatus::Delivered)
}

pub fn mark_read<S: Storage + ?Sized>(
    store: &S,
    acker: &Identity,
    message_id: MessageId,
) -> Result<Effects> {
    acknowledge(store, acker, message_id, MessageStatus::Read)
}
