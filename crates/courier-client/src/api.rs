//! REST collaborator.
//!
//! [`ChatApi`] is the seam between the sync core and the backend; the
//! production implementation is [`HttpApi`] over `reqwest`. Every response
//! is wrapped in a `{success, message, data}` envelope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use courier_shared::protocol::SendMessagePayload;
use courier_shared::{
    ConversationId, MessageId, MessageKind, MessageStatus, PresenceStatus, UserId,
};
use courier_store::{Conversation, LastMessage, Message, Participant};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantDto {
    pub user_id: UserId,
    pub full_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastMessageDto {
    pub message_id: MessageId,
    pub message_text: String,
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

/// Conversation summary from `GET /conversations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDto {
    pub conversation_id: ConversationId,
    pub participant: ParticipantDto,
    #[serde(default)]
    pub last_message: Option<LastMessageDto>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_muted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw record returned by get-or-create (`POST /conversations`).
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub user_one_id: UserId,
    pub user_two_id: UserId,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_muted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDetailDto {
    pub user_id: UserId,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDto {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message_text: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Vec<StatusDetailDto>,
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        Self {
            id: dto.conversation_id,
            participant: Participant {
                id: dto.participant.user_id,
                display_name: dto.participant.full_name,
                username: dto.participant.username,
                avatar_url: dto.participant.avatar_url,
                status: dto
                    .participant
                    .status
                    .as_deref()
                    .map(PresenceStatus::from_str_lossy)
                    .unwrap_or_default(),
                last_seen_at: dto.participant.last_seen_at,
            },
            last_message: dto.last_message.map(|m| LastMessage {
                id: m.message_id,
                text: m.message_text,
                sender_id: m.sender_id,
                created_at: m.created_at,
                is_read: m.is_read,
            }),
            unread_count: dto.unread_count,
            is_archived: dto.is_archived,
            is_muted: dto.is_muted,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        }
    }
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        // The furthest status reported for the receiver wins.
        let status = dto
            .status
            .iter()
            .filter(|s| s.user_id == dto.receiver_id)
            .map(|s| s.status)
            .max()
            .unwrap_or(MessageStatus::Sent);

        Self {
            id: dto.message_id,
            conversation_id: dto.conversation_id,
            sender_id: dto.sender_id,
            receiver_id: dto.receiver_id,
            text: dto.message_text,
            kind: dto.message_type,
            media_url: dto.media_url,
            file_name: dto.file_name,
            file_size: dto.file_size,
            status,
            is_edited: dto.is_edited,
            is_deleted: dto.is_deleted,
            created_at: dto.created_at,
            pending: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator trait
// ---------------------------------------------------------------------------

/// REST endpoints consumed by the sync core.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /conversations`
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// `POST /conversations {participant_id}` (get-or-create)
    async fn start_conversation(&self, participant: UserId) -> Result<ConversationRecord>;

    /// `GET /messages/{cid}?limit&offset`. The page is newest first.
    async fn fetch_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>>;

    /// `POST /messages/send`
    async fn send_message(&self, request: &SendMessagePayload) -> Result<Message>;

    /// `PUT /messages/{id}/status {status}`
    async fn update_status(&self, message: MessageId, status: MessageStatus) -> Result<()>;

    /// `POST /messages/{cid}/mark-read`
    async fn mark_read(&self, conversation: ConversationId) -> Result<()>;

    /// `DELETE /conversations/{id}`
    async fn delete_conversation(&self, conversation: ConversationId) -> Result<()>;

    /// `PUT /messages/{id} {message_text}`
    async fn edit_message(&self, message: MessageId, text: &str) -> Result<Message>;

    /// `DELETE /messages/{id}`
    async fn delete_message(&self, message: MessageId) -> Result<()>;

    /// `POST /conversations/{id}/archive {is_archived}`
    async fn set_archived(&self, conversation: ConversationId, archived: bool) -> Result<()>;

    /// `POST /conversations/{id}/mute {is_muted}`
    async fn set_muted(&self, conversation: ConversationId, muted: bool) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StartConversationBody {
    participant_id: UserId,
}

#[derive(Serialize)]
struct StatusBody {
    status: MessageStatus,
}

#[derive(Serialize)]
struct EditBody<'a> {
    message_text: &'a str,
}

#[derive(Serialize)]
struct ArchiveBody {
    is_archived: bool,
}

#[derive(Serialize)]
struct MuteBody {
    is_muted: bool,
}

/// [`ChatApi`] over HTTP with bearer-token authentication.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpApi {
    pub fn new(config: &ClientConfig, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| status.to_string());
            tracing::debug!(status = status.as_u16(), message = %message, "API request failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_else(|| "request failed".into()),
            });
        }
        Ok(envelope.data)
    }

    async fn call_data<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.call(request)
            .await?
            .ok_or_else(|| ClientError::Decode(format!("missing {what} in response")))
    }

    async fn call_unit(&self, request: RequestBuilder) -> Result<()> {
        self.call::<serde_json::Value>(request).await.map(|_| ())
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let req = self.client.get(self.url("/conversations"));
        let list: Vec<ConversationDto> = self.call(req).await?.unwrap_or_default();
        Ok(list.into_iter().map(Conversation::from).collect())
    }

    async fn start_conversation(&self, participant: UserId) -> Result<ConversationRecord> {
        let req = self
            .client
            .post(self.url("/conversations"))
            .json(&StartConversationBody {
                participant_id: participant,
            });
        self.call_data(req, "conversation").await
    }

    async fn fetch_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let req = self
            .client
            .get(self.url(&format!("/messages/{conversation}")))
            .query(&[("limit", limit), ("offset", offset)]);
        let page: Vec<MessageDto> = self.call(req).await?.unwrap_or_default();
        Ok(page.into_iter().map(Message::from).collect())
    }

    async fn send_message(&self, request: &SendMessagePayload) -> Result<Message> {
        let req = self.client.post(self.url("/messages/send")).json(request);
        let dto: MessageDto = self.call_data(req, "message").await?;
        Ok(dto.into())
    }

    async fn update_status(&self, message: MessageId, status: MessageStatus) -> Result<()> {
        let req = self
            .client
            .put(self.url(&format!("/messages/{message}/status")))
            .json(&StatusBody { status });
        self.call_unit(req).await
    }

    async fn mark_read(&self, conversation: ConversationId) -> Result<()> {
        let req = self
            .client
            .post(self.url(&format!("/messages/{conversation}/mark-read")));
        self.call_unit(req).await
    }

    async fn delete_conversation(&self, conversation: ConversationId) -> Result<()> {
        let req = self
            .client
            .delete(self.url(&format!("/conversations/{conversation}")));
        self.call_unit(req).await
    }

    async fn edit_message(&self, message: MessageId, text: &str) -> Result<Message> {
        let req = self
            .client
            .put(self.url(&format!("/messages/{message}")))
            .json(&EditBody { message_text: text });
        let dto: MessageDto = self.call_data(req, "message").await?;
        Ok(dto.into())
    }

    async fn delete_message(&self, message: MessageId) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/messages/{message}")));
        self.call_unit(req).await
    }

    async fn set_archived(&self, conversation: ConversationId, archived: bool) -> Result<()> {
        let req = self
            .client
            .post(self.url(&format!("/conversations/{conversation}/archive")))
            .json(&ArchiveBody {
                is_archived: archived,
            });
        self.call_unit(req).await
    }

    async fn set_muted(&self, conversation: ConversationId, muted: bool) -> Result<()> {
        let req = self
            .client
            .post(self.url(&format!("/conversations/{conversation}/mute")))
            .json(&MuteBody { is_muted: muted });
        self.call_unit(req).await
    }
}
