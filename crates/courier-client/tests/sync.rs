//! End-to-end behaviour of a chat session against an in-memory REST API
//! and the channel transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::{broadcast, Notify};

use courier_client::api::{ChatApi, ConversationRecord};
use courier_client::pagination::LoadOutcome;
use courier_client::transport::{transport_channels, TransportEvent, TransportLink};
use courier_client::{ChatSession, ClientConfig, ClientError, StoreChange};
use courier_shared::protocol::SendMessagePayload;
use courier_shared::{
    ClientEvent, ConversationId, MessageId, MessageKind, MessageStatus, PresenceStatus, UserId,
};
use courier_store::{Conversation, Message, Participant};

const ME: UserId = UserId(1);
const C: ConversationId = ConversationId(42);
const OTHER: ConversationId = ConversationId(43);

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn conversation(id: ConversationId, peer: i64, updated: i64) -> Conversation {
    Conversation {
        id,
        participant: Participant {
            id: UserId(peer),
            display_name: format!("peer-{peer}"),
            username: None,
            avatar_url: None,
            status: PresenceStatus::Offline,
            last_seen_at: None,
        },
        last_message: None,
        unread_count: 0,
        is_archived: false,
        is_muted: false,
        created_at: t(0),
        updated_at: t(updated),
    }
}

fn history_message(id: i64, conv: ConversationId, secs: i64) -> Message {
    Message {
        id: MessageId(id),
        conversation_id: conv,
        sender_id: UserId(7),
        receiver_id: ME,
        text: format!("m{id}"),
        kind: MessageKind::Text,
        media_url: None,
        file_name: None,
        file_size: None,
        status: MessageStatus::Read,
        is_edited: false,
        is_deleted: false,
        created_at: t(secs),
        pending: false,
    }
}

// ---------------------------------------------------------------------------
// Fake REST collaborator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeApi {
    conversations: Mutex<Vec<Conversation>>,
    /// Ascending history per conversation.
    history: Mutex<HashMap<ConversationId, Vec<Message>>>,
    fetch_calls: AtomicUsize,
    mark_read_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    fail_fetch: AtomicBool,
    fail_send: AtomicBool,
    next_id: AtomicI64,
    sent: Mutex<Vec<SendMessagePayload>>,
}

impl FakeApi {
    fn new() -> Arc<Self> {
        let api = Self::default();
        api.next_id.store(500, Ordering::SeqCst);
        *api.conversations.lock().unwrap() = vec![conversation(C, 7, 10), conversation(OTHER, 8, 20)];
        Arc::new(api)
    }

    fn with_history(self: Arc<Self>, conv: ConversationId, count: i64) -> Arc<Self> {
        let list = (1..=count).map(|i| history_message(i, conv, i)).collect();
        self.history.lock().unwrap().insert(conv, list);
        self
    }

    fn hold_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn fail(code: u16) -> ClientError {
        ClientError::Api {
            status: code,
            message: "unavailable".into(),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(&self) -> courier_client::Result<Vec<Conversation>> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn start_conversation(&self, participant: UserId) -> courier_client::Result<ConversationRecord> {
        Ok(ConversationRecord {
            id: ConversationId(77),
            user_one_id: ME,
            user_two_id: participant,
            is_archived: false,
            is_muted: false,
            created_at: t(0),
            updated_at: t(0),
        })
    }

    async fn fetch_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> courier_client::Result<Vec<Message>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::fail(503));
        }
        let history = self.history.lock().unwrap();
        let page = history
            .get(&conversation)
            .map(|list| {
                list.iter()
                    .rev()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page)
    }

    async fn send_message(&self, request: &SendMessagePayload) -> courier_client::Result<Message> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Self::fail(500));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(Message {
            id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            conversation_id: request.conversation_id,
            sender_id: ME,
            receiver_id: request.receiver_id,
            text: request.message_text.clone(),
            kind: request.message_type,
            media_url: request.media_url.clone(),
            file_name: None,
            file_size: None,
            status: MessageStatus::Sent,
            is_edited: false,
            is_deleted: false,
            created_at: Utc::now(),
            pending: false,
        })
    }

    async fn update_status(&self, _message: MessageId, _status: MessageStatus) -> courier_client::Result<()> {
        Ok(())
    }

    async fn mark_read(&self, _conversation: ConversationId) -> courier_client::Result<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_conversation(&self, _conversation: ConversationId) -> courier_client::Result<()> {
        Ok(())
    }

    async fn edit_message(&self, message: MessageId, text: &str) -> courier_client::Result<Message> {
        let mut m = history_message(message.get(), C, 0);
        m.text = text.to_string();
        m.is_edited = true;
        Ok(m)
    }

    async fn delete_message(&self, _message: MessageId) -> courier_client::Result<()> {
        Ok(())
    }

    async fn set_archived(&self, _conversation: ConversationId, _archived: bool) -> courier_client::Result<()> {
        Ok(())
    }

    async fn set_muted(&self, _conversation: ConversationId, _muted: bool) -> courier_client::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    session: Arc<ChatSession>,
    api: Arc<FakeApi>,
    link: TransportLink,
    changes: broadcast::Receiver<StoreChange>,
}

async fn harness(api: Arc<FakeApi>) -> anyhow::Result<Harness> {
    let config = ClientConfig {
        page_size: 50,
        ..ClientConfig::default()
    };
    let (link, ports) = transport_channels();
    let session = ChatSession::start(config, ME, api.clone(), ports);
    session.refresh_conversations().await?;
    let changes = session.subscribe();
    Ok(Harness {
        session: Arc::new(session),
        api,
        link,
        changes,
    })
}

async fn wait_for(
    changes: &mut broadcast::Receiver<StoreChange>,
    pred: impl Fn(&StoreChange) -> bool,
) -> anyhow::Result<StoreChange> {
    let next = async {
        loop {
            let change = changes.recv().await?;
            if pred(&change) {
                return Ok::<_, anyhow::Error>(change);
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), next).await?
}

async fn connect(h: &mut Harness) -> anyhow::Result<()> {
    h.link.inbound.send(TransportEvent::Connected).await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::ConnectionChanged { .. })).await?;
    Ok(())
}

async fn push(h: &Harness, name: &str, data: serde_json::Value) -> anyhow::Result<()> {
    h.link
        .inbound
        .send(TransportEvent::Event {
            name: name.to_string(),
            data,
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn received_message_bumps_unread_and_moves_conversation_first() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;
    connect(&mut h).await?;
    assert_eq!(h.session.conversation_list()[0].id, OTHER);

    push(
        &h,
        "message:receive",
        json!({
            "id": "1001",
            "conversation_id": 42,
            "sender_id": 7,
            "receiver_id": 1,
            "message_text": "hi",
            "created_at": t(100).to_rfc3339(),
        }),
    )
    .await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::UnreadChanged { .. })).await?;

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId(1001));
    assert_eq!(h.session.unread_count(C), 1);
    assert_eq!(h.session.conversation_list()[0].id, C);
    assert_eq!(h.session.total_unread(), 1);
    Ok(())
}

#[tokio::test]
async fn transport_send_is_confirmed_by_ack() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;
    connect(&mut h).await?;

    let receipt = h.session.send_text(C, "hello").await?;
    assert_eq!(receipt.confirmed_id, None);

    match h.link.outbound.recv().await {
        Some(ClientEvent::MessageSend(payload)) => {
            assert_eq!(payload.conversation_id, C);
            assert_eq!(payload.receiver_id, UserId(7));
            assert_eq!(payload.message_text, "hello");
        }
        other => panic!("expected message:send, got {other:?}"),
    }
    assert!(h.session.messages(C)[0].pending);

    push(
        &h,
        "message:sent",
        json!({
            "id": 55,
            "conversation_id": 42,
            "sender_id": 1,
            "receiver_id": 7,
            "message_text": "hello",
            "message_type": "text",
            "created_at": Utc::now().to_rfc3339(),
        }),
    )
    .await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::MessageConfirmed { .. })).await?;

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId(55));
    assert_eq!(messages[0].status, MessageStatus::Sent);
    assert!(!messages[0].pending);
    assert!(h.api.sent.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn payloads_without_receiver_are_applied() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;
    connect(&mut h).await?;

    push(
        &h,
        "message:receive",
        json!({
            "id": 1001,
            "conversation_id": 42,
            "sender_id": 7,
            "message_text": "hi",
            "created_at": t(100).to_rfc3339(),
        }),
    )
    .await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::UnreadChanged { .. })).await?;

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId(1001));
    assert_eq!(messages[0].receiver_id, ME);
    assert_eq!(h.session.unread_count(C), 1);

    h.session.send_text(C, "hello").await?;
    assert!(matches!(h.link.outbound.recv().await, Some(ClientEvent::MessageSend(_))));
    push(
        &h,
        "message:sent",
        json!({
            "id": 55,
            "conversation_id": 42,
            "sender_id": 1,
            "message_text": "hello",
            "created_at": Utc::now().to_rfc3339(),
        }),
    )
    .await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::MessageConfirmed { .. })).await?;

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 2);
    let sent = messages.iter().find(|m| m.id == MessageId(55)).expect("ack applied");
    assert_eq!(sent.receiver_id, UserId(7));
    assert!(!sent.pending);
    assert!(messages.iter().all(|m| !m.pending));
    Ok(())
}

#[tokio::test]
async fn send_during_initial_load_survives_the_page() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;
    connect(&mut h).await?;

    let gate = h.api.hold_fetches();
    let session = h.session.clone();
    let open = tokio::spawn(async move { session.open_conversation(C).await });
    while h.api.fetch_calls.load(Ordering::SeqCst) < 1 {
        tokio::task::yield_now().await;
    }

    h.session.send_text(C, "hello").await?;
    assert!(matches!(h.link.outbound.recv().await, Some(ClientEvent::MessageSend(_))));

    gate.notify_one();
    assert_eq!(open.await??, LoadOutcome::Loaded(0));
    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].pending);

    push(
        &h,
        "message:sent",
        json!({
            "id": 55,
            "conversation_id": 42,
            "sender_id": 1,
            "receiver_id": 7,
            "message_text": "hello",
            "created_at": Utc::now().to_rfc3339(),
        }),
    )
    .await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::MessageConfirmed { .. })).await?;

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, MessageId(55));
    assert!(!messages[0].pending);
    Ok(())
}

#[tokio::test]
async fn rest_fallback_confirms_and_late_ack_is_noop() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;

    let receipt = h.session.send_text(C, "offline hello").await?;
    let confirmed = receipt.confirmed_id.expect("REST path confirms immediately");

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, confirmed);
    assert!(!messages[0].pending);

    connect(&mut h).await?;
    push(
        &h,
        "message:sent",
        json!({
            "id": confirmed.get(),
            "conversation_id": 42,
            "sender_id": 1,
            "receiver_id": 7,
            "message_text": "offline hello",
            "created_at": Utc::now().to_rfc3339(),
        }),
    )
    .await?;
    // A later event proves the ack was processed.
    push(&h, "typing:start", json!({ "conversation_id": 42, "user_id": 7 })).await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::TypingChanged { .. })).await?;

    assert_eq!(h.session.messages(C).len(), 1);
    assert!(h.session.is_peer_typing(C));
    Ok(())
}

#[tokio::test]
async fn failed_send_removes_optimistic_message() -> anyhow::Result<()> {
    let h = harness(FakeApi::new()).await?;
    h.api.fail_send.store(true, Ordering::SeqCst);

    let err = h.session.send_text(C, "lost").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));
    assert!(h.session.messages(C).is_empty());
    Ok(())
}

#[tokio::test]
async fn double_load_more_issues_one_request() -> anyhow::Result<()> {
    let h = harness(FakeApi::new().with_history(C, 120)).await?;

    assert_eq!(h.session.open_conversation(C).await?, LoadOutcome::Loaded(50));
    assert_eq!(h.api.fetch_calls.load(Ordering::SeqCst), 1);

    let gate = h.api.hold_fetches();
    let session = h.session.clone();
    let first = tokio::spawn(async move { session.load_more(C).await });

    while h.api.fetch_calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }
    assert!(h.session.is_loading(C));
    assert_eq!(h.session.load_more(C).await?, LoadOutcome::AlreadyLoading);
    assert_eq!(h.api.fetch_calls.load(Ordering::SeqCst), 2);

    gate.notify_one();
    assert_eq!(first.await??, LoadOutcome::Loaded(50));

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 100);
    assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    assert_eq!(messages[0].id, MessageId(21));
    Ok(())
}

#[tokio::test]
async fn pagination_stops_when_history_is_exhausted() -> anyhow::Result<()> {
    let h = harness(FakeApi::new().with_history(C, 120)).await?;

    h.session.open_conversation(C).await?;
    assert_eq!(h.session.load_more(C).await?, LoadOutcome::Loaded(50));
    assert!(h.session.has_more(C));
    assert_eq!(h.session.load_more(C).await?, LoadOutcome::Loaded(20));
    assert!(!h.session.has_more(C));

    let calls = h.api.fetch_calls.load(Ordering::SeqCst);
    assert_eq!(h.session.load_more(C).await?, LoadOutcome::Exhausted);
    assert_eq!(h.api.fetch_calls.load(Ordering::SeqCst), calls);
    assert_eq!(h.session.messages(C).len(), 120);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_leaves_store_unchanged() -> anyhow::Result<()> {
    let h = harness(FakeApi::new().with_history(C, 120)).await?;
    h.session.open_conversation(C).await?;
    let before = h.session.messages(C);

    h.api.fail_fetch.store(true, Ordering::SeqCst);
    assert!(h.session.load_more(C).await.is_err());

    assert_eq!(h.session.messages(C), before);
    assert!(!h.session.is_loading(C));
    assert!(h.session.has_more(C));
    Ok(())
}

#[tokio::test]
async fn late_page_after_navigating_away_is_discarded() -> anyhow::Result<()> {
    let h = harness(FakeApi::new().with_history(C, 120)).await?;
    h.session.open_conversation(C).await?;

    let gate = h.api.hold_fetches();
    let session = h.session.clone();
    let pending = tokio::spawn(async move { session.load_more(C).await });
    while h.api.fetch_calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    h.session.close_conversation();
    gate.notify_one();

    assert_eq!(pending.await??, LoadOutcome::Discarded);
    assert_eq!(h.session.messages(C).len(), 50);
    assert!(!h.session.is_loading(C));
    Ok(())
}

#[tokio::test]
async fn resync_replaces_history_while_older_page_is_in_flight() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new().with_history(C, 120)).await?;
    h.session.open_conversation(C).await?;
    connect(&mut h).await?;

    let gate = h.api.hold_fetches();
    let session = h.session.clone();
    let older = tokio::spawn(async move { session.load_more(C).await });
    while h.api.fetch_calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    h.link
        .inbound
        .send(TransportEvent::Disconnected {
            reason: "transport close".into(),
        })
        .await?;
    h.api
        .history
        .lock()
        .unwrap()
        .get_mut(&C)
        .expect("seeded history")
        .push(history_message(121, C, 121));
    h.link.inbound.send(TransportEvent::Connected).await?;

    while h.api.fetch_calls.load(Ordering::SeqCst) < 3 {
        tokio::task::yield_now().await;
    }
    gate.notify_waiters();

    assert_eq!(older.await??, LoadOutcome::Discarded);
    wait_for(&mut h.changes, |c| {
        matches!(c, StoreChange::MessagesReplaced { conversation_id } if *conversation_id == C)
    })
    .await?;

    let messages = h.session.messages(C);
    assert_eq!(messages.len(), 50);
    assert_eq!(messages.last().map(|m| m.id), Some(MessageId(121)));
    assert_eq!(messages[0].id, MessageId(72));
    assert!(!h.session.is_loading(C));
    assert!(h.session.has_more(C));
    Ok(())
}

#[tokio::test]
async fn opening_conversation_marks_it_read() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;
    connect(&mut h).await?;
    push(
        &h,
        "message:receive",
        json!({
            "id": 9,
            "conversation_id": 42,
            "sender_id": 7,
            "receiver_id": 1,
            "message_text": "ping",
            "created_at": t(100).to_rfc3339(),
        }),
    )
    .await?;
    wait_for(&mut h.changes, |c| matches!(c, StoreChange::UnreadChanged { .. })).await?;

    h.session.open_conversation(C).await?;
    assert_eq!(h.session.unread_count(C), 0);
    assert_eq!(h.api.mark_read_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn reconnect_refetches_conversations() -> anyhow::Result<()> {
    let mut h = harness(FakeApi::new()).await?;
    connect(&mut h).await?;

    h.link
        .inbound
        .send(TransportEvent::Disconnected {
            reason: "transport close".into(),
        })
        .await?;
    h.api
        .conversations
        .lock()
        .unwrap()
        .push(conversation(ConversationId(44), 9, 30));

    h.link.inbound.send(TransportEvent::Connected).await?;
    wait_for(&mut h.changes, |c| *c == StoreChange::ConversationsReplaced).await?;

    let ids: Vec<ConversationId> = h.session.conversation_list().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![ConversationId(44), OTHER, C]);
    Ok(())
}

#[tokio::test]
async fn start_chat_and_delete() -> anyhow::Result<()> {
    let h = harness(FakeApi::new()).await?;

    let id = h.session.start_chat(UserId(9)).await?;
    assert_eq!(id, ConversationId(77));
    assert!(h.session.conversation_list().iter().any(|c| c.id == id));

    h.session.delete_conversation(C).await?;
    assert!(h.session.conversation_list().iter().all(|c| c.id != C));
    assert!(matches!(
        h.session.send_text(C, "gone").await,
        Err(ClientError::UnknownConversation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn logout_clears_session_data() -> anyhow::Result<()> {
    let h = harness(FakeApi::new().with_history(C, 5)).await?;
    h.session.open_conversation(C).await?;
    let store = h.session.store();

    let session = Arc::try_unwrap(h.session).map_err(|_| anyhow::anyhow!("session still shared"))?;
    session.logout();

    let store = store.lock().unwrap();
    assert!(store.conversation_list().is_empty());
    assert!(store.messages(C).is_empty());
    assert_eq!(store.selected_conversation(), None);
    Ok(())
}
