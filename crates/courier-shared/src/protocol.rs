//! Push-transport wire protocol.
//!
//! The transport delivers named events with a JSON payload. On the inbound
//! channel each event is carried as a frame `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::{ConversationId, MessageId, MessageKind, UserId};

/// A new message as pushed by the server (`message:receive`, `message:sent`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Omitted by some servers; the receiving side fills it in.
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    pub message_text: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Delivery / read receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub message_id: MessageId,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

/// Presence change. Older servers send `userId` instead of `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    #[serde(default, alias = "userId")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// New message from the remote peer.
    MessageReceived(MessagePayload),
    /// Server confirmation of a message the local user sent.
    MessageSentAck(MessagePayload),
    MessageDelivered(StatusPayload),
    MessageRead(StatusPayload),
    /// Server-side send failure; carries whatever the server reported.
    MessageError(Value),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    PresenceUpdate(PresencePayload),
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
}

/// Raw `{event, data}` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

fn decode<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

impl ServerEvent {
    /// Decode a named event and its payload.
    pub fn from_frame(event: &str, data: Value) -> Result<Self, ProtocolError> {
        let ev = match event {
            EVENT_MESSAGE_RECEIVE => Self::MessageReceived(decode(event, data)?),
            EVENT_MESSAGE_SENT => Self::MessageSentAck(decode(event, data)?),
            EVENT_MESSAGE_DELIVERED => Self::MessageDelivered(decode(event, data)?),
            EVENT_MESSAGE_READ => Self::MessageRead(decode(event, data)?),
            EVENT_MESSAGE_ERROR => Self::MessageError(data),
            EVENT_TYPING_START => Self::TypingStart(decode(event, data)?),
            EVENT_TYPING_STOP => Self::TypingStop(decode(event, data)?),
            EVENT_PRESENCE_UPDATE => Self::PresenceUpdate(decode(event, data)?),
            EVENT_USER_ONLINE => Self::UserOnline(decode(event, data)?),
            EVENT_USER_OFFLINE => Self::UserOffline(decode(event, data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(ev)
    }

    /// Decode a JSON frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(text)?;
        Self::from_frame(&frame.event, frame.data)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageReceived(_) => EVENT_MESSAGE_RECEIVE,
            Self::MessageSentAck(_) => EVENT_MESSAGE_SENT,
            Self::MessageDelivered(_) => EVENT_MESSAGE_DELIVERED,
            Self::MessageRead(_) => EVENT_MESSAGE_READ,
            Self::MessageError(_) => EVENT_MESSAGE_ERROR,
            Self::TypingStart(_) => EVENT_TYPING_START,
            Self::TypingStop(_) => EVENT_TYPING_STOP,
            Self::PresenceUpdate(_) => EVENT_PRESENCE_UPDATE,
            Self::UserOnline(_) => EVENT_USER_ONLINE,
            Self::UserOffline(_) => EVENT_USER_OFFLINE,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub conversation_id: ConversationId,
    pub receiver_id: UserId,
    pub message_text: String,
    pub message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceiptPayload {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingNotice {
    pub conversation_id: ConversationId,
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceNotice {
    pub is_online: bool,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "message:send")]
    MessageSend(SendMessagePayload),
    #[serde(rename = "message:read")]
    MessageRead(ReadReceiptPayload),
    #[serde(rename = "typing:start")]
    TypingStart(TypingNotice),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingNotice),
    #[serde(rename = "presence:update")]
    PresenceUpdate(PresenceNotice),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSend(_) => EVENT_MESSAGE_SEND,
            Self::MessageRead(_) => EVENT_MESSAGE_READ,
            Self::TypingStart(_) => EVENT_TYPING_START,
            Self::TypingStop(_) => EVENT_TYPING_STOP,
            Self::PresenceUpdate(_) => EVENT_PRESENCE_UPDATE,
        }
    }

    /// Serialize to a JSON frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
