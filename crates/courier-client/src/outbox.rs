//! Outgoing sends.
//!
//! A send inserts an optimistic message first. When the transport is up
//! the message goes out as `message:send` and the server's `message:sent`
//! acknowledgement confirms it through the reconciler. Otherwise it goes
//! through REST and the response confirms it directly. A failed REST send
//! removes the optimistic message.

use std::sync::Arc;

use chrono::Utc;

use courier_shared::protocol::SendMessagePayload;
use courier_shared::{ClientEvent, ConnectionState, MessageId, UserId};
use courier_store::{Confirmation, Message, OutgoingMessage};

use crate::api::ChatApi;
use crate::error::Result;
use crate::events::{ChangeNotifier, StoreChange};
use crate::state::{lock, SharedStore};
use crate::transport::TransportHandle;

/// Ids assigned to a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    pub provisional_id: MessageId,
    /// Known when the REST path was used; otherwise the acknowledgement
    /// arrives later over the transport.
    pub confirmed_id: Option<MessageId>,
}

#[derive(Clone)]
pub struct Outbox {
    api: Arc<dyn ChatApi>,
    store: SharedStore,
    notifier: ChangeNotifier,
    transport: TransportHandle,
    local_user: UserId,
}

impl Outbox {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: SharedStore,
        notifier: ChangeNotifier,
        transport: TransportHandle,
        local_user: UserId,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            transport,
            local_user,
        }
    }

    pub async fn send(&self, draft: OutgoingMessage) -> Result<SendReceipt> {
        let conversation_id = draft.conversation_id;
        let (provisional_id, connected) = {
            let mut store = lock(&self.store);
            let mut message = Message::optimistic(&draft, self.local_user, Utc::now());
            // Two sends within the same millisecond must not share an id.
            while store.contains_message(conversation_id, message.id) {
                message.id = MessageId(message.id.get() + 1);
            }
            let id = message.id;
            store.insert_optimistic(message);
            (id, store.connection_state() == ConnectionState::Connected)
        };
        self.notifier.emit(StoreChange::MessageAdded {
            conversation_id,
            message_id: provisional_id,
        });

        let payload = SendMessagePayload {
            conversation_id,
            receiver_id: draft.receiver_id,
            message_text: draft.text,
            message_type: draft.kind,
            media_url: draft.media_url,
        };

        if connected {
            match self.transport.emit(ClientEvent::MessageSend(payload.clone())).await {
                Ok(()) => {
                    tracing::debug!(conversation = %conversation_id, provisional = %provisional_id, "message sent over transport");
                    return Ok(SendReceipt {
                        provisional_id,
                        confirmed_id: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transport send failed, falling back to REST");
                }
            }
        }

        match self.api.send_message(&payload).await {
            Ok(sent) => {
                let confirmation = Confirmation {
                    id: sent.id,
                    created_at: sent.created_at,
                };
                let confirmed = lock(&self.store).confirm_message(conversation_id, provisional_id, confirmation);
                if confirmed {
                    self.notifier.emit(StoreChange::MessageConfirmed {
                        conversation_id,
                        provisional_id,
                        message_id: sent.id,
                    });
                }
                Ok(SendReceipt {
                    provisional_id,
                    confirmed_id: Some(sent.id),
                })
            }
            Err(e) => {
                let removed = lock(&self.store).remove_message(conversation_id, provisional_id);
                if removed {
                    self.notifier.emit(StoreChange::MessageRemoved {
                        conversation_id,
                        message_id: provisional_id,
                    });
                }
                tracing::warn!(conversation = %conversation_id, error = %e, "send failed");
                Err(e)
            }
        }
    }
}
