//! Chat session lifecycle.
//!
//! A [`ChatSession`] is created at login with the local user's id, a REST
//! collaborator and the core-facing transport ports. It owns the Message
//! Store, runs the reconciler loop and a resync task, and exposes the
//! actions and read accessors the view layer uses. Logout tears it down and
//! clears the store.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courier_shared::protocol::{PresenceNotice, ReadReceiptPayload};
use courier_shared::{
    ClientEvent, ConnectionState, ConversationId, MessageId, MessageKind, MessageStatus, UserId,
};
use courier_store::{Conversation, ConversationSummary, Message, OutgoingMessage, Participant};

use crate::api::ChatApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ChangeNotifier, StoreChange};
use crate::outbox::{Outbox, SendReceipt};
use crate::pagination::{LoadOutcome, PaginationController};
use crate::reconciler::Reconciler;
use crate::state::{lock, new_shared_store, SharedStore};
use crate::transport::{TransportHandle, TransportPorts};
use crate::typing::TypingNotifier;

// ---------------------------------------------------------------------------
// Resynchronisation
// ---------------------------------------------------------------------------

/// REST re-fetch used at startup, after a reconnect, and when a message
/// arrives for a conversation that is not listed.
#[derive(Clone)]
struct Synchronizer {
    api: Arc<dyn ChatApi>,
    store: SharedStore,
    notifier: ChangeNotifier,
    pagination: PaginationController,
}

impl Synchronizer {
    async fn refresh_conversations(&self) -> Result<usize> {
        let list = self.api.list_conversations().await?;
        let count = list.len();
        lock(&self.store).replace_conversation_list(list);
        self.notifier.emit(StoreChange::ConversationsReplaced);
        Ok(count)
    }

    async fn resync(&self) -> Result<()> {
        self.refresh_conversations().await?;
        let selected = lock(&self.store).selected_conversation();
        if let Some(conversation) = selected {
            self.pagination.load_initial(conversation).await?;
        }
        Ok(())
    }
}

async fn resync_loop(sync: Synchronizer, mut changes: broadcast::Receiver<StoreChange>) {
    loop {
        let result = match changes.recv().await {
            Ok(StoreChange::Resync) => sync.resync().await,
            Ok(StoreChange::ConversationListStale { conversation_id }) => {
                debug!(conversation = %conversation_id, "refreshing conversation list");
                sync.refresh_conversations().await.map(|_| ())
            }
            Ok(_) => Ok(()),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "change stream lagged, resyncing");
                sync.resync().await
            }
            Err(RecvError::Closed) => break,
        };
        if let Err(e) = result {
            warn!(error = %e, "resync failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct ChatSession {
    config: ClientConfig,
    local_user: UserId,
    store: SharedStore,
    api: Arc<dyn ChatApi>,
    notifier: ChangeNotifier,
    transport: TransportHandle,
    sync: Synchronizer,
    outbox: Outbox,
    typing: TypingNotifier,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Start a session. Spawns the reconciler loop on the current Tokio
    /// runtime; call [`refresh_conversations`](Self::refresh_conversations)
    /// afterwards for the initial fetch.
    pub fn start(
        config: ClientConfig,
        local_user: UserId,
        api: Arc<dyn ChatApi>,
        ports: TransportPorts,
    ) -> Self {
        let TransportPorts { handle, events } = ports;
        let store = new_shared_store(config.monotonic_status);
        let notifier = ChangeNotifier::new();

        let pagination = PaginationController::new(
            api.clone(),
            store.clone(),
            notifier.clone(),
            config.page_size,
        );
        let sync = Synchronizer {
            api: api.clone(),
            store: store.clone(),
            notifier: notifier.clone(),
            pagination,
        };
        let outbox = Outbox::new(
            api.clone(),
            store.clone(),
            notifier.clone(),
            handle.clone(),
            local_user,
        );
        let typing = TypingNotifier::new(handle.clone(), config.typing_idle());
        let reconciler = Reconciler::new(
            store.clone(),
            notifier.clone(),
            local_user,
            config.ack_window(),
        );

        let tasks = vec![
            tokio::spawn(resync_loop(sync.clone(), notifier.subscribe())),
            tokio::spawn(reconciler.run(events)),
        ];

        info!(user = %local_user, api = %config.api_url, "chat session started");

        Self {
            config,
            local_user,
            store,
            api,
            notifier,
            transport: handle,
            sync,
            outbox,
            typing,
            tasks,
        }
    }

    /// Tear the session down and clear all session data.
    pub fn logout(self) {
        self.typing.stop();
        lock(&self.store).clear();
        info!(user = %self.local_user, "chat session ended");
        // Drop aborts the background tasks.
    }

    // -- read accessors -----------------------------------------------------

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.notifier.subscribe()
    }

    pub fn conversation_list(&self) -> Vec<ConversationSummary> {
        lock(&self.store).conversation_list()
    }

    pub fn messages(&self, conversation: ConversationId) -> Vec<Message> {
        lock(&self.store).messages(conversation).to_vec()
    }

    pub fn is_peer_typing(&self, conversation: ConversationId) -> bool {
        lock(&self.store).is_peer_typing(conversation)
    }

    pub fn unread_count(&self, conversation: ConversationId) -> u32 {
        lock(&self.store).unread_count(conversation)
    }

    pub fn total_unread(&self) -> u32 {
        lock(&self.store).total_unread()
    }

    pub fn has_more(&self, conversation: ConversationId) -> bool {
        lock(&self.store).has_more(conversation)
    }

    pub fn is_loading(&self, conversation: ConversationId) -> bool {
        lock(&self.store).is_loading(conversation)
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.store).connection_state()
    }

    // -- conversations ------------------------------------------------------

    pub async fn refresh_conversations(&self) -> Result<usize> {
        self.sync.refresh_conversations().await
    }

    /// Re-fetch the conversation list and the open conversation's history.
    pub async fn resync(&self) -> Result<()> {
        self.sync.resync().await
    }

    /// Select a conversation, load its newest page and mark it read.
    pub async fn open_conversation(&self, conversation: ConversationId) -> Result<LoadOutcome> {
        let unread = {
            let mut store = lock(&self.store);
            if !store.contains_conversation(conversation) {
                return Err(ClientError::UnknownConversation(conversation));
            }
            store.select_conversation(conversation);
            store.unread_count(conversation)
        };
        self.typing.stop();

        let outcome = self.sync.pagination.load_initial(conversation).await?;
        if unread > 0 {
            if let Err(e) = self.mark_read(conversation).await {
                warn!(conversation = %conversation, error = %e, "mark read failed");
            }
        }
        Ok(outcome)
    }

    pub fn close_conversation(&self) {
        self.typing.stop();
        lock(&self.store).clear_selection();
    }

    pub async fn load_more(&self, conversation: ConversationId) -> Result<LoadOutcome> {
        self.sync.pagination.load_more(conversation).await
    }

    /// Get or create the conversation with `participant`.
    pub async fn start_chat(&self, participant: UserId) -> Result<ConversationId> {
        let record = self.api.start_conversation(participant).await?;
        let conversation_id = record.id;
        self.sync.refresh_conversations().await?;

        let mut store = lock(&self.store);
        if !store.contains_conversation(conversation_id) {
            // Listed only once it has messages on some backends.
            store.upsert_conversation(Conversation {
                id: conversation_id,
                participant: Participant {
                    id: participant,
                    display_name: String::new(),
                    username: None,
                    avatar_url: None,
                    status: Default::default(),
                    last_seen_at: None,
                },
                last_message: None,
                unread_count: 0,
                is_archived: record.is_archived,
                is_muted: record.is_muted,
                created_at: record.created_at,
                updated_at: record.updated_at,
            });
            drop(store);
            self.notifier
                .emit(StoreChange::ConversationUpdated { conversation_id });
        }
        info!(conversation = %conversation_id, participant = %participant, "chat started");
        Ok(conversation_id)
    }

    pub async fn delete_conversation(&self, conversation: ConversationId) -> Result<()> {
        self.api.delete_conversation(conversation).await?;
        if lock(&self.store).delete_conversation(conversation) {
            self.notifier.emit(StoreChange::ConversationRemoved {
                conversation_id: conversation,
            });
        }
        Ok(())
    }

    /// Mark every message in the conversation read on the server and reset
    /// the local counter.
    pub async fn mark_read(&self, conversation: ConversationId) -> Result<()> {
        self.api.mark_read(conversation).await?;
        if lock(&self.store).mark_conversation_read(conversation) {
            self.notifier.emit(StoreChange::UnreadChanged {
                conversation_id: conversation,
                unread_count: 0,
            });
        }
        Ok(())
    }

    pub async fn set_archived(&self, conversation: ConversationId, archived: bool) -> Result<()> {
        self.api.set_archived(conversation, archived).await?;
        if lock(&self.store).set_archived(conversation, archived) {
            self.notifier.emit(StoreChange::ConversationUpdated {
                conversation_id: conversation,
            });
        }
        Ok(())
    }

    pub async fn set_muted(&self, conversation: ConversationId, muted: bool) -> Result<()> {
        self.api.set_muted(conversation, muted).await?;
        if lock(&self.store).set_muted(conversation, muted) {
            self.notifier.emit(StoreChange::ConversationUpdated {
                conversation_id: conversation,
            });
        }
        Ok(())
    }

    // -- messages -----------------------------------------------------------

    pub async fn send_text(&self, conversation: ConversationId, text: &str) -> Result<SendReceipt> {
        let receiver_id = self.peer_of(conversation)?;
        self.send(OutgoingMessage {
            conversation_id: conversation,
            receiver_id,
            text: text.to_string(),
            kind: MessageKind::Text,
            media_url: None,
        })
        .await
    }

    pub async fn send(&self, draft: OutgoingMessage) -> Result<SendReceipt> {
        self.typing.stop();
        self.outbox.send(draft).await
    }

    /// Tell the peer a message was read: `message:read` over the transport
    /// when connected, REST status update otherwise.
    pub async fn send_read_receipt(
        &self,
        conversation: ConversationId,
        message: MessageId,
    ) -> Result<()> {
        if self.connection_state() == ConnectionState::Connected {
            self.transport
                .emit(ClientEvent::MessageRead(ReadReceiptPayload {
                    message_id: message,
                    conversation_id: conversation,
                }))
                .await
        } else {
            self.api.update_status(message, MessageStatus::Read).await
        }
    }

    pub async fn mark_delivered(&self, message: MessageId) -> Result<()> {
        self.api.update_status(message, MessageStatus::Delivered).await
    }

    pub async fn edit_message(&self, message: MessageId, text: &str) -> Result<()> {
        let updated = self.api.edit_message(message, text).await?;
        if lock(&self.store).edit_message(message, &updated.text) {
            self.notifier.emit(StoreChange::MessageUpdated { message_id: message });
        }
        Ok(())
    }

    pub async fn delete_message(&self, message: MessageId) -> Result<()> {
        self.api.delete_message(message).await?;
        if lock(&self.store).mark_message_deleted(message) {
            self.notifier.emit(StoreChange::MessageUpdated { message_id: message });
        }
        Ok(())
    }

    // -- presence and typing ------------------------------------------------

    pub async fn set_presence(&self, is_online: bool) -> Result<()> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        self.transport
            .emit(ClientEvent::PresenceUpdate(PresenceNotice { is_online }))
            .await
    }

    /// Record a keystroke in the composer of `conversation`.
    pub fn keystroke(&self, conversation: ConversationId) -> Result<()> {
        let peer = self.peer_of(conversation)?;
        if self.connection_state() == ConnectionState::Connected {
            self.typing.keystroke(conversation, peer);
        }
        Ok(())
    }

    pub fn stop_typing(&self) {
        self.typing.stop();
    }

    fn peer_of(&self, conversation: ConversationId) -> Result<UserId> {
        lock(&self.store)
            .conversation(conversation)
            .map(|c| c.participant.id)
            .ok_or(ClientError::UnknownConversation(conversation))
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
