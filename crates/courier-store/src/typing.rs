use courier_shared::{ConversationId, UserId};

use crate::store::MessageStore;

impl MessageStore {
    /// Add or remove `user` from the conversation's typing set. Returns
    /// whether the set changed.
    pub fn set_typing(&mut self, conversation: ConversationId, user: UserId, is_typing: bool) -> bool {
        if is_typing {
            self.typing.entry(conversation).or_default().insert(user)
        } else {
            let Some(set) = self.typing.get_mut(&conversation) else {
                return false;
            };
            let removed = set.remove(&user);
            if set.is_empty() {
                self.typing.remove(&conversation);
            }
            removed
        }
    }

    pub fn typing_users(&self, conversation: ConversationId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .typing
            .get(&conversation)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Whether the conversation's peer is typing. For a conversation not in
    /// the list, any typing user counts.
    pub fn is_peer_typing(&self, conversation: ConversationId) -> bool {
        let Some(set) = self.typing.get(&conversation) else {
            return false;
        };
        match self.conversations.get(&conversation) {
            Some(c) => set.contains(&c.participant.id),
            None => !set.is_empty(),
        }
    }
}
