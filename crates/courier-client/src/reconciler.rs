//! Sync Reconciler.
//!
//! Consumes [`TransportEvent`]s from a single inbound channel and turns them
//! into Message Store mutations. Malformed or unknown events are logged and
//! dropped; nothing here can tear the transport down.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use courier_shared::protocol::{MessagePayload, PresencePayload, StatusPayload, TypingPayload};
use courier_shared::{ConnectionState, MessageStatus, PresenceStatus, ServerEvent, UserId};
use courier_store::{Confirmation, Message, MessageStore};

use crate::events::{ChangeNotifier, StoreChange};
use crate::state::{lock, SharedStore};
use crate::transport::TransportEvent;

pub struct Reconciler {
    store: SharedStore,
    notifier: ChangeNotifier,
    local_user: UserId,
    ack_window: chrono::Duration,
    connected_once: bool,
}

impl Reconciler {
    pub fn new(
        store: SharedStore,
        notifier: ChangeNotifier,
        local_user: UserId,
        ack_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            local_user,
            ack_window,
            connected_once: false,
        }
    }

    /// Process events until the inbound channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<TransportEvent>) {
        info!(user = %self.local_user, "reconciler started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        info!("reconciler stopped");
    }

    /// Apply one transport event and publish the resulting changes.
    pub fn handle(&mut self, event: TransportEvent) {
        let changes = match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected { reason } => {
                warn!(reason = %reason, "transport disconnected");
                let mut store = lock(&self.store);
                store.set_connection_state(ConnectionState::Disconnected);
                vec![StoreChange::ConnectionChanged {
                    state: ConnectionState::Disconnected,
                }]
            }
            TransportEvent::Event { name, data } => match ServerEvent::from_frame(&name, data) {
                Ok(ev) => self.apply(ev),
                Err(e) => {
                    warn!(event = %name, error = %e, "dropping transport event");
                    Vec::new()
                }
            },
        };
        self.notifier.emit_all(changes);
    }

    fn on_connected(&mut self) -> Vec<StoreChange> {
        let previous = lock(&self.store).set_connection_state(ConnectionState::Connected);
        let mut changes = vec![StoreChange::ConnectionChanged {
            state: ConnectionState::Connected,
        }];
        if self.connected_once && previous == ConnectionState::Disconnected {
            info!("transport reconnected, resync required");
            changes.push(StoreChange::Resync);
        } else {
            info!("transport connected");
        }
        self.connected_once = true;
        changes
    }

    /// Apply a decoded server event at the current time.
    pub fn apply(&self, event: ServerEvent) -> Vec<StoreChange> {
        self.apply_at(event, Utc::now())
    }

    /// Apply a decoded server event; `now` anchors the acknowledgement
    /// matching window.
    pub fn apply_at(&self, event: ServerEvent, now: DateTime<Utc>) -> Vec<StoreChange> {
        let mut store = lock(&self.store);
        match event {
            ServerEvent::MessageReceived(p) => self.on_received(&mut store, p),
            ServerEvent::MessageSentAck(p) => self.on_sent_ack(&mut store, p, now),
            ServerEvent::MessageDelivered(s) => on_status(&mut store, s, MessageStatus::Delivered),
            ServerEvent::MessageRead(s) => on_status(&mut store, s, MessageStatus::Read),
            ServerEvent::MessageError(detail) => {
                warn!(detail = %detail, "server reported a message error");
                Vec::new()
            }
            ServerEvent::TypingStart(t) => on_typing(&mut store, t, true),
            ServerEvent::TypingStop(t) => on_typing(&mut store, t, false),
            ServerEvent::PresenceUpdate(p) => {
                let status = match p.is_online {
                    Some(true) => PresenceStatus::Online,
                    Some(false) => PresenceStatus::Offline,
                    None => {
                        debug!("presence update without is_online dropped");
                        return Vec::new();
                    }
                };
                on_presence(&mut store, p, status)
            }
            ServerEvent::UserOnline(p) => on_presence(&mut store, p, PresenceStatus::Online),
            ServerEvent::UserOffline(p) => on_presence(&mut store, p, PresenceStatus::Offline),
        }
    }

    fn on_received(&self, store: &mut MessageStore, payload: MessagePayload) -> Vec<StoreChange> {
        let conversation_id = payload.conversation_id;
        let message_id = payload.id;

        if store.contains_message(conversation_id, message_id) {
            debug!(conversation = %conversation_id, message = %message_id, "duplicate message ignored");
            return Vec::new();
        }

        let peer = store.conversation(conversation_id).map(|c| c.participant.id);
        let listed = peer.is_some();
        let from_peer = payload.sender_id != self.local_user;
        let receiver = if from_peer {
            self.local_user
        } else {
            peer.unwrap_or(self.local_user)
        };
        store.append_message(conversation_id, Message::from_payload(payload, receiver));

        let mut changes = vec![StoreChange::MessageAdded {
            conversation_id,
            message_id,
        }];
        if !listed {
            changes.push(StoreChange::ConversationListStale { conversation_id });
        } else if from_peer && !store.is_selected(conversation_id) {
            store.increment_unread(conversation_id);
            changes.push(StoreChange::UnreadChanged {
                conversation_id,
                unread_count: store.unread_count(conversation_id),
            });
        }
        debug!(conversation = %conversation_id, message = %message_id, "message received");
        changes
    }

    fn on_sent_ack(
        &self,
        store: &mut MessageStore,
        payload: MessagePayload,
        now: DateTime<Utc>,
    ) -> Vec<StoreChange> {
        let conversation_id = payload.conversation_id;
        let confirmation = Confirmation {
            id: payload.id,
            created_at: payload.created_at,
        };
        match store.confirm_pending(
            conversation_id,
            payload.sender_id,
            &payload.message_text,
            confirmation,
            now,
            self.ack_window,
        ) {
            Some(provisional_id) => vec![StoreChange::MessageConfirmed {
                conversation_id,
                provisional_id,
                message_id: payload.id,
            }],
            None => {
                debug!(conversation = %conversation_id, message = %payload.id, "send ack without pending message");
                Vec::new()
            }
        }
    }
}

fn on_status(store: &mut MessageStore, payload: StatusPayload, status: MessageStatus) -> Vec<StoreChange> {
    let mut changes = Vec::new();
    if store.set_message_status(payload.message_id, status) {
        changes.push(StoreChange::MessageUpdated {
            message_id: payload.message_id,
        });
    }
    if status == MessageStatus::Read {
        if let Some(conversation_id) = payload.conversation_id {
            if store.contains_conversation(conversation_id) {
                store.decrement_unread(conversation_id);
                changes.push(StoreChange::UnreadChanged {
                    conversation_id,
                    unread_count: store.unread_count(conversation_id),
                });
            }
        }
    }
    changes
}

fn on_typing(store: &mut MessageStore, payload: TypingPayload, is_typing: bool) -> Vec<StoreChange> {
    if store.set_typing(payload.conversation_id, payload.user_id, is_typing) {
        vec![StoreChange::TypingChanged {
            conversation_id: payload.conversation_id,
            user_id: payload.user_id,
            is_typing,
        }]
    } else {
        Vec::new()
    }
}

fn on_presence(
    store: &mut MessageStore,
    payload: PresencePayload,
    status: PresenceStatus,
) -> Vec<StoreChange> {
    let Some(user_id) = payload.user_id else {
        debug!("presence event without user id dropped");
        return Vec::new();
    };
    if store.set_presence(user_id, status, payload.last_seen_at) > 0 {
        vec![StoreChange::PresenceChanged { user_id }]
    } else {
        Vec::new()
    }
}
