use chrono::{DateTime, Duration, Utc};

use courier_shared::{ConversationId, MessageId, MessageStatus, UserId};

use crate::models::{Confirmation, LastMessage, Message, PaginationCursor};
use crate::store::MessageStore;

impl MessageStore {
    /// Messages of a conversation, oldest first. Empty if none are loaded.
    pub fn messages(&self, conversation: ConversationId) -> &[Message] {
        self.messages
            .get(&conversation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look a message up by id across all conversations.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages
            .values()
            .flat_map(|list| list.iter())
            .find(|m| m.id == id)
    }

    pub fn contains_message(&self, conversation: ConversationId, id: MessageId) -> bool {
        self.messages(conversation).iter().any(|m| m.id == id)
    }

    /// Replace a conversation's history wholesale and reset its cursor.
    ///
    /// `messages` may arrive in any order; the list is stored ascending by
    /// creation time. Pending optimistic messages are not on the server yet
    /// and are carried over at their timestamp position. The cursor restarts
    /// at `offset = len` of the server page, reports more history only if
    /// the page was full, and moves to a new generation so that any page
    /// still in flight is discarded.
    pub fn replace_messages(
        &mut self,
        conversation: ConversationId,
        mut messages: Vec<Message>,
        requested_limit: u32,
    ) {
        for m in &mut messages {
            m.conversation_id = conversation;
        }
        let len = messages.len() as u32;

        let pending: Vec<Message> = self
            .messages
            .remove(&conversation)
            .unwrap_or_default()
            .into_iter()
            .filter(|m| m.pending && !messages.iter().any(|fresh| fresh.id == m.id))
            .collect();
        let carried = pending.len();
        messages.extend(pending);
        messages.sort_by_key(|m| m.created_at);

        let generation = self.next_generation();
        self.messages.insert(conversation, messages);
        self.cursors.insert(
            conversation,
            PaginationCursor {
                offset: len,
                limit: requested_limit,
                has_more: requested_limit > 0 && len == requested_limit,
                loading: false,
                generation,
            },
        );
        tracing::debug!(conversation = %conversation, count = len, carried, "messages replaced");
    }

    /// Insert a message at its timestamp position (normally the tail) and
    /// refresh the conversation's preview and ordering.
    ///
    /// Not idempotent: callers must not append the same server id twice.
    pub fn append_message(&mut self, conversation: ConversationId, mut message: Message) {
        message.conversation_id = conversation;
        let created_at = message.created_at;
        let preview = LastMessage::from(&message);

        let list = self.messages.entry(conversation).or_default();
        let pos = list.partition_point(|m| m.created_at <= created_at);
        list.insert(pos, message);

        match self.conversations.get_mut(&conversation) {
            Some(c) => {
                let newer = c
                    .last_message
                    .as_ref()
                    .map_or(true, |last| created_at >= last.created_at);
                if newer {
                    c.last_message = Some(preview);
                }
                if created_at > c.updated_at {
                    c.updated_at = created_at;
                }
                self.resort();
            }
            None => {
                tracing::debug!(conversation = %conversation, "message stored for unlisted conversation");
            }
        }
    }

    /// Place an ascending page of older history before the current head.
    ///
    /// Messages already present (overlap caused by newer arrivals shifting
    /// server offsets) are skipped. The cursor advances by the page length.
    /// Returns the number of messages actually inserted.
    pub fn prepend_older_messages(
        &mut self,
        conversation: ConversationId,
        older: Vec<Message>,
        requested_limit: u32,
    ) -> usize {
        let page_len = older.len() as u32;
        let list = self.messages.entry(conversation).or_default();

        let fresh: Vec<Message> = older
            .into_iter()
            .filter(|m| !list.iter().any(|existing| existing.id == m.id))
            .map(|mut m| {
                m.conversation_id = conversation;
                m
            })
            .collect();
        let inserted = fresh.len();
        let mut merged = fresh;
        merged.append(list);
        *list = merged;

        let cursor = self.cursors.entry(conversation).or_default();
        cursor.offset = cursor.offset.saturating_add(page_len);
        cursor.limit = requested_limit;
        cursor.has_more = requested_limit > 0 && page_len == requested_limit;
        cursor.loading = false;

        tracing::debug!(
            conversation = %conversation,
            page = page_len,
            inserted,
            offset = cursor.offset,
            has_more = cursor.has_more,
            "older messages prepended"
        );
        inserted
    }

    /// Update a message's status wherever it lives.
    ///
    /// Unknown ids are a no-op: the status is not buffered for a message
    /// that arrives later. With the monotonic guard enabled a status never
    /// moves backwards. Returns whether a message changed.
    pub fn set_message_status(&mut self, id: MessageId, status: MessageStatus) -> bool {
        let Some((conversation, idx)) = self.locate(id) else {
            tracing::debug!(message = %id, status = %status, "status for unknown message dropped");
            return false;
        };

        let monotonic = self.monotonic_status;
        let Some(message) = self
            .messages
            .get_mut(&conversation)
            .and_then(|list| list.get_mut(idx))
        else {
            return false;
        };
        if monotonic && status < message.status {
            tracing::debug!(message = %id, current = %message.status, status = %status, "status regression ignored");
            return false;
        }
        message.status = status;

        if let Some(last) = self
            .conversations
            .get_mut(&conversation)
            .and_then(|c| c.last_message.as_mut())
            .filter(|last| last.id == id)
        {
            last.is_read = status == MessageStatus::Read;
        }
        true
    }

    // -- optimistic sends ---------------------------------------------------

    /// Insert a locally created message that awaits confirmation.
    pub fn insert_optimistic(&mut self, mut message: Message) {
        message.pending = true;
        message.status = MessageStatus::Sent;
        let conversation = message.conversation_id;
        tracing::debug!(conversation = %conversation, provisional = %message.id, "optimistic message inserted");
        self.append_message(conversation, message);
    }

    /// Reconcile a send acknowledgement with the most recent pending message
    /// in `conversation` from `sender` with exactly `text`, created no more
    /// than `window` before `now`.
    ///
    /// Returns the provisional id that was replaced, or `None` if nothing
    /// matched (the message was already confirmed through another path).
    pub fn confirm_pending(
        &mut self,
        conversation: ConversationId,
        sender: UserId,
        text: &str,
        confirmation: Confirmation,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Option<MessageId> {
        let idx = self.messages(conversation).iter().rposition(|m| {
            m.pending
                && m.sender_id == sender
                && m.text == text
                && now.signed_duration_since(m.created_at) <= window
        })?;
        self.apply_confirmation(conversation, idx, confirmation)
    }

    /// Confirm a pending message by its provisional id (REST send response).
    /// Returns `false` if it is no longer pending.
    pub fn confirm_message(
        &mut self,
        conversation: ConversationId,
        provisional: MessageId,
        confirmation: Confirmation,
    ) -> bool {
        let Some(idx) = self
            .messages(conversation)
            .iter()
            .position(|m| m.pending && m.id == provisional)
        else {
            return false;
        };
        self.apply_confirmation(conversation, idx, confirmation)
            .is_some()
    }

    fn apply_confirmation(
        &mut self,
        conversation: ConversationId,
        idx: usize,
        confirmation: Confirmation,
    ) -> Option<MessageId> {
        let list = self.messages.get_mut(&conversation)?;
        let mut message = list.remove(idx);
        let provisional = message.id;

        // The confirmed copy may already be stored (e.g. echoed back as a
        // regular message); keep exactly one.
        let duplicate = list.iter().any(|m| m.id == confirmation.id);
        if !duplicate {
            message.id = confirmation.id;
            message.created_at = confirmation.created_at;
            message.status = MessageStatus::Sent;
            message.pending = false;
            let pos = list.partition_point(|m| m.created_at <= confirmation.created_at);
            list.insert(pos, message);
        }

        let tail = list.last().map(LastMessage::from);
        if let Some(c) = self.conversations.get_mut(&conversation) {
            let stale = c.last_message.as_ref().map_or(false, |l| l.id == provisional);
            if stale {
                c.last_message = tail;
            }
            if confirmation.created_at > c.updated_at {
                c.updated_at = confirmation.created_at;
            }
        }
        self.resort();

        tracing::debug!(
            conversation = %conversation,
            provisional = %provisional,
            confirmed = %confirmation.id,
            "optimistic message confirmed"
        );
        Some(provisional)
    }

    // -- edits --------------------------------------------------------------

    /// Remove a message (e.g. a failed optimistic send).
    pub fn remove_message(&mut self, conversation: ConversationId, id: MessageId) -> bool {
        let Some(list) = self.messages.get_mut(&conversation) else {
            return false;
        };
        let Some(idx) = list.iter().position(|m| m.id == id) else {
            return false;
        };
        list.remove(idx);
        let tail = list.last().map(LastMessage::from);

        if let Some(c) = self.conversations.get_mut(&conversation) {
            if c.last_message.as_ref().map_or(false, |l| l.id == id) {
                c.last_message = tail;
                self.resort();
            }
        }
        true
    }

    /// Replace a message's text and flag it as edited.
    pub fn edit_message(&mut self, id: MessageId, text: &str) -> bool {
        self.rewrite(id, |m| {
            m.text = text.to_string();
            m.is_edited = true;
        })
    }

    /// Flag a message as deleted and clear its content.
    pub fn mark_message_deleted(&mut self, id: MessageId) -> bool {
        self.rewrite(id, |m| {
            m.text.clear();
            m.media_url = None;
            m.is_deleted = true;
        })
    }

    fn rewrite(&mut self, id: MessageId, f: impl FnOnce(&mut Message)) -> bool {
        let Some((conversation, idx)) = self.locate(id) else {
            return false;
        };
        let Some(message) = self
            .messages
            .get_mut(&conversation)
            .and_then(|list| list.get_mut(idx))
        else {
            return false;
        };
        f(message);
        let text = message.text.clone();

        if let Some(last) = self
            .conversations
            .get_mut(&conversation)
            .and_then(|c| c.last_message.as_mut())
            .filter(|last| last.id == id)
        {
            last.text = text;
        }
        true
    }

    fn locate(&self, id: MessageId) -> Option<(ConversationId, usize)> {
        self.messages.iter().find_map(|(conversation, list)| {
            list.iter()
                .position(|m| m.id == id)
                .map(|idx| (*conversation, idx))
        })
    }
}
