use chrono::{DateTime, Utc};

use courier_shared::{ConversationId, PresenceStatus, UserId};

use crate::models::Conversation;
use crate::store::MessageStore;

impl MessageStore {
    /// Replace the whole conversation set, e.g. after the initial fetch or a
    /// resync. Loaded message lists are kept.
    pub fn replace_conversation_list(&mut self, list: Vec<Conversation>) {
        self.conversations = list.into_iter().map(|c| (c.id, c)).collect();
        self.typing
            .retain(|id, _| self.conversations.contains_key(id));
        self.resort();
        tracing::debug!(count = self.conversations.len(), "conversation list replaced");
    }

    /// Insert a conversation, or replace the cached record if it exists.
    /// Used after "start chat" returns a get-or-create record.
    ///
    /// A replacement keeps the local unread counter and cached last message
    /// when the incoming record carries none.
    pub fn upsert_conversation(&mut self, mut conversation: Conversation) {
        if let Some(existing) = self.conversations.get(&conversation.id) {
            if conversation.last_message.is_none() {
                conversation.last_message = existing.last_message.clone();
                conversation.unread_count = existing.unread_count;
            }
        }
        self.conversations.insert(conversation.id, conversation);
        self.resort();
    }

    /// Remove a conversation together with its messages, cursor and typing
    /// set. Returns `false` if it was unknown.
    pub fn delete_conversation(&mut self, id: ConversationId) -> bool {
        let removed = self.conversations.remove(&id).is_some();
        self.messages.remove(&id);
        self.cursors.remove(&id);
        self.typing.remove(&id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        if removed {
            self.resort();
            tracing::debug!(conversation = %id, "conversation deleted");
        }
        removed
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    pub fn contains_conversation(&self, id: ConversationId) -> bool {
        self.conversations.contains_key(&id)
    }

    // -- unread -------------------------------------------------------------

    pub fn increment_unread(&mut self, id: ConversationId) {
        if let Some(c) = self.conversations.get_mut(&id) {
            c.unread_count = c.unread_count.saturating_add(1);
        }
    }

    /// Decrement, clamped at zero.
    pub fn decrement_unread(&mut self, id: ConversationId) {
        if let Some(c) = self.conversations.get_mut(&id) {
            c.unread_count = c.unread_count.saturating_sub(1);
        }
    }

    /// Reset the unread counter and flag the cached preview as read.
    pub fn mark_conversation_read(&mut self, id: ConversationId) -> bool {
        match self.conversations.get_mut(&id) {
            Some(c) => {
                c.unread_count = 0;
                if let Some(last) = c.last_message.as_mut() {
                    last.is_read = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn unread_count(&self, id: ConversationId) -> u32 {
        self.conversations
            .get(&id)
            .map(|c| c.unread_count)
            .unwrap_or(0)
    }

    /// Sum of unread counters over all conversations.
    pub fn total_unread(&self) -> u32 {
        self.conversations
            .values()
            .map(|c| c.unread_count)
            .fold(0u32, u32::saturating_add)
    }

    // -- presence and flags -------------------------------------------------

    /// Update the cached status of every conversation whose peer is `user`.
    /// Returns the number of conversations touched.
    pub fn set_presence(
        &mut self,
        user: UserId,
        status: PresenceStatus,
        last_seen_at: Option<DateTime<Utc>>,
    ) -> usize {
        let mut touched = 0;
        for c in self.conversations.values_mut() {
            if c.participant.id == user {
                c.participant.status = status;
                if last_seen_at.is_some() {
                    c.participant.last_seen_at = last_seen_at;
                }
                touched += 1;
            }
        }
        touched
    }

    pub fn set_archived(&mut self, id: ConversationId, archived: bool) -> bool {
        match self.conversations.get_mut(&id) {
            Some(c) => {
                c.is_archived = archived;
                true
            }
            None => false,
        }
    }

    pub fn set_muted(&mut self, id: ConversationId, muted: bool) -> bool {
        match self.conversations.get_mut(&id) {
            Some(c) => {
                c.is_muted = muted;
                true
            }
            None => false,
        }
    }
}
