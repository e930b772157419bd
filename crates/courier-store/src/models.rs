//! Domain models held by the Message Store.
//!
//! Every struct derives `Serialize` so it can be handed directly to the
//! view layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_shared::protocol::MessagePayload;
use courier_shared::{ConversationId, MessageId, MessageKind, MessageStatus, PresenceStatus, UserId};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// The single remote peer of a one-to-one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub display_name: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Cached preview of the newest message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub id: MessageId,
    pub text: String,
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl From<&Message> for LastMessage {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            text: m.text.clone(),
            sender_id: m.sender_id,
            created_at: m.created_at,
            is_read: m.status == MessageStatus::Read,
        }
    }
}

/// A one-to-one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant: Participant,
    pub last_message: Option<LastMessage>,
    /// Never negative; decrements clamp at zero.
    pub unread_count: u32,
    pub is_archived: bool,
    pub is_muted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Most recent activity: the later of the cached last message and the
    /// conversation's own update timestamp.
    pub fn last_activity(&self) -> DateTime<Utc> {
        match &self.last_message {
            Some(last) if last.created_at > self.updated_at => last.created_at,
            _ => self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub status: MessageStatus,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    /// Set while the message carries a provisional id and awaits server
    /// confirmation.
    #[serde(default)]
    pub pending: bool,
}

/// Draft of a message the local user is about to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub receiver_id: UserId,
    pub text: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
}

impl Message {
    /// Build an optimistic message. The provisional id is the local send
    /// time in Unix milliseconds.
    pub fn optimistic(draft: &OutgoingMessage, sender_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId(now.timestamp_millis()),
            conversation_id: draft.conversation_id,
            sender_id,
            receiver_id: draft.receiver_id,
            text: draft.text.clone(),
            kind: draft.kind,
            media_url: draft.media_url.clone(),
            file_name: None,
            file_size: None,
            status: MessageStatus::Sent,
            is_edited: false,
            is_deleted: false,
            created_at: now,
            pending: true,
        }
    }
}

impl Message {
    /// Build a stored message from a pushed payload. `receiver_id` is used
    /// when the payload does not name the receiver.
    pub fn from_payload(p: MessagePayload, receiver_id: UserId) -> Self {
        Self {
            id: p.id,
            conversation_id: p.conversation_id,
            sender_id: p.sender_id,
            receiver_id: p.receiver_id.unwrap_or(receiver_id),
            text: p.message_text,
            kind: p.message_type,
            media_url: p.media_url,
            file_name: p.file_name,
            file_size: p.file_size,
            status: MessageStatus::Sent,
            is_edited: false,
            is_deleted: false,
            created_at: p.created_at,
            pending: false,
        }
    }
}

/// Server-assigned identity of a confirmed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pagination cursor
// ---------------------------------------------------------------------------

/// Per-conversation history paging state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Number of server messages already loaded (newest-first offset).
    pub offset: u32,
    /// Page size of the last request.
    pub limit: u32,
    pub has_more: bool,
    pub loading: bool,
    /// Bumped whenever a fetch is handed out or the history is replaced.
    /// A page fetched under an older generation is stale.
    #[serde(default)]
    pub generation: u64,
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 0,
            has_more: true,
            loading: false,
            generation: 0,
        }
    }
}
