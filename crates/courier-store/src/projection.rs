//! Conversation List Projection.
//!
//! The ordered id list is recomputed from the conversation set after every
//! mutation that can change ordering; summaries are built on read and hold
//! no state of their own.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::Serialize;

use courier_shared::{ConversationId, PresenceStatus, UserId};

use crate::store::MessageStore;

/// One row of the conversation list as rendered by the view layer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub peer_id: UserId,
    pub peer_name: String,
    pub peer_avatar: Option<String>,
    pub peer_status: PresenceStatus,
    pub preview: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: u32,
    pub is_typing: bool,
    pub is_archived: bool,
    pub is_muted: bool,
}

impl MessageStore {
    /// Sort by most recent activity descending, ties by id descending.
    pub(crate) fn resort(&mut self) {
        let mut ids: Vec<ConversationId> = self.conversations.keys().copied().collect();
        ids.sort_by_key(|id| {
            let activity = self.conversations[id].last_activity();
            (Reverse(activity), Reverse(*id))
        });
        self.order = ids;
    }

    /// Conversation ids, most recently active first.
    pub fn ordered_ids(&self) -> &[ConversationId] {
        &self.order
    }

    /// The sorted conversation list.
    pub fn conversation_list(&self) -> Vec<ConversationSummary> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .map(|c| ConversationSummary {
                id: c.id,
                peer_id: c.participant.id,
                peer_name: c.participant.display_name.clone(),
                peer_avatar: c.participant.avatar_url.clone(),
                peer_status: c.participant.status,
                preview: c.last_message.as_ref().map(|m| m.text.clone()),
                last_activity: c.last_activity(),
                unread_count: c.unread_count,
                is_typing: self.is_peer_typing(c.id),
                is_archived: c.is_archived,
                is_muted: c.is_muted,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::*;

    fn ids(store: &MessageStore) -> Vec<i64> {
        store.ordered_ids().iter().map(|id| id.get()).collect()
    }

    #[test]
    fn test_sorted_by_activity_then_id() {
        let mut store = MessageStore::new();
        store.replace_conversation_list(vec![
            conversation(1, 11, 10),
            conversation(2, 12, 30),
            conversation(3, 13, 10),
            conversation(4, 14, 20),
        ]);
        assert_eq!(ids(&store), vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_new_message_moves_only_its_conversation() {
        let mut store = MessageStore::new();
        store.replace_conversation_list(vec![
            conversation(1, 11, 10),
            conversation(2, 12, 30),
            conversation(3, 13, 20),
            conversation(4, 14, 40),
        ]);
        assert_eq!(ids(&store), vec![4, 2, 3, 1]);

        store.append_message(ConversationId(1), message(100, 1, 11, "hey", 50));
        assert_eq!(ids(&store), vec![1, 4, 2, 3]);
    }

    #[test]
    fn test_last_message_newer_than_update_counts() {
        let mut store = MessageStore::new();
        let mut a = conversation(1, 11, 10);
        a.last_message = Some(crate::models::LastMessage::from(&message(5, 1, 11, "x", 60)));
        store.replace_conversation_list(vec![a, conversation(2, 12, 30)]);
        assert_eq!(ids(&store), vec![1, 2]);
    }

    #[test]
    fn test_summary_reflects_store() {
        let mut store = MessageStore::new();
        store.replace_conversation_list(vec![conversation(1, 11, 10)]);
        store.append_message(ConversationId(1), message(100, 1, 11, "hey", 50));
        store.increment_unread(ConversationId(1));
        store.set_typing(ConversationId(1), UserId(11), true);

        let list = store.conversation_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].preview.as_deref(), Some("hey"));
        assert_eq!(list[0].unread_count, 1);
        assert_eq!(list[0].last_activity, ts(50));
        assert!(list[0].is_typing);
    }
}
