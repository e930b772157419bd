//! Change notifications for the view layer.
//!
//! Every store mutation performed by the client publishes a [`StoreChange`]
//! on a broadcast channel; views re-read the store on receipt.

use serde::Serialize;
use tokio::sync::broadcast;

use courier_shared::constants::EVENT_CHANNEL_CAPACITY;
use courier_shared::{ConnectionState, ConversationId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreChange {
    ConversationsReplaced,
    ConversationUpdated {
        conversation_id: ConversationId,
    },
    ConversationRemoved {
        conversation_id: ConversationId,
    },
    /// A message arrived for a conversation that is not in the list yet.
    ConversationListStale {
        conversation_id: ConversationId,
    },
    MessagesReplaced {
        conversation_id: ConversationId,
    },
    OlderMessagesLoaded {
        conversation_id: ConversationId,
        count: usize,
    },
    MessageAdded {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    MessageConfirmed {
        conversation_id: ConversationId,
        provisional_id: MessageId,
        message_id: MessageId,
    },
    /// Status, text or deleted flag changed.
    MessageUpdated {
        message_id: MessageId,
    },
    MessageRemoved {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    UnreadChanged {
        conversation_id: ConversationId,
        unread_count: u32,
    },
    TypingChanged {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },
    PresenceChanged {
        user_id: UserId,
    },
    ConnectionChanged {
        state: ConnectionState,
    },
    /// The transport came back after a disconnect; REST state should be
    /// re-fetched.
    Resync,
}

/// Sender side of the change channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    /// Publish a change. Having no subscriber is not an error.
    pub fn emit(&self, change: StoreChange) {
        if self.tx.send(change).is_err() {
            tracing::trace!("no change subscribers");
        }
    }

    pub fn emit_all(&self, changes: impl IntoIterator<Item = StoreChange>) {
        for change in changes {
            self.emit(change);
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
