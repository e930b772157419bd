//! Pagination cursor bookkeeping.
//!
//! The controller that drives history fetches lives in the client crate;
//! the store only tracks offsets and the in-flight flag so that a late or
//! overlapping page can be recognised and discarded.

use courier_shared::ConversationId;

use crate::models::{Message, PaginationCursor};
use crate::store::MessageStore;

/// Outcome of asking for an older-history slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSlot {
    /// Fetch the page at `offset`; the cursor is now marked loading under
    /// `generation`.
    Ready { offset: u32, generation: u64 },
    /// Another fetch for this conversation is in flight.
    InFlight,
    /// The server reported no more history.
    Exhausted,
    /// No initial page has been loaded yet.
    Unloaded,
}

/// Outcome of merging a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMerge {
    Merged(usize),
    /// The page no longer matches the store (conversation deleted, history
    /// replaced, or superseded by a newer fetch) and was dropped.
    Discarded,
}

impl MessageStore {
    pub fn cursor(&self, conversation: ConversationId) -> Option<&PaginationCursor> {
        self.cursors.get(&conversation)
    }

    /// Whether older history can be requested. `false` until the first page
    /// has been loaded.
    pub fn has_more(&self, conversation: ConversationId) -> bool {
        self.cursors
            .get(&conversation)
            .map_or(false, |c| c.has_more)
    }

    pub fn is_loading(&self, conversation: ConversationId) -> bool {
        self.cursors
            .get(&conversation)
            .map_or(false, |c| c.loading)
    }

    /// Mark a newest-page load as in flight and return its generation.
    ///
    /// Always granted: a fetch already in flight for the conversation
    /// (older page or an earlier initial load) is superseded and its page
    /// will be discarded.
    pub fn begin_initial_load(&mut self, conversation: ConversationId) -> u64 {
        let generation = self.next_generation();
        let cursor = self.cursors.entry(conversation).or_default();
        if cursor.loading {
            tracing::debug!(conversation = %conversation, "in-flight history fetch superseded");
        }
        cursor.generation = generation;
        cursor.loading = true;
        generation
    }

    /// Merge the initial page (oldest first) fetched under `generation`.
    /// Dropped if the conversation was deleted or a newer fetch took over
    /// while this one was in flight.
    pub fn finish_initial_load(
        &mut self,
        conversation: ConversationId,
        generation: u64,
        messages: Vec<Message>,
        requested_limit: u32,
    ) -> PageMerge {
        if !self.contains_conversation(conversation) {
            self.cursors.remove(&conversation);
            tracing::debug!(conversation = %conversation, "initial page for removed conversation discarded");
            return PageMerge::Discarded;
        }
        if !self.is_current(conversation, generation) {
            tracing::debug!(conversation = %conversation, generation, "superseded initial page discarded");
            return PageMerge::Discarded;
        }
        let count = messages.len();
        self.replace_messages(conversation, messages, requested_limit);
        PageMerge::Merged(count)
    }

    /// Reserve the next older page. Never hands out a slot while another
    /// fetch is in flight or once history is exhausted.
    pub fn begin_older_load(&mut self, conversation: ConversationId) -> PageSlot {
        let offset = match self.cursors.get(&conversation) {
            None => return PageSlot::Unloaded,
            Some(c) if c.loading => return PageSlot::InFlight,
            Some(c) if !c.has_more => return PageSlot::Exhausted,
            Some(c) => c.offset,
        };
        let generation = self.next_generation();
        if let Some(cursor) = self.cursors.get_mut(&conversation) {
            cursor.generation = generation;
            cursor.loading = true;
        }
        PageSlot::Ready { offset, generation }
    }

    /// Merge an older page fetched under `generation`.
    ///
    /// The page is discarded if the conversation is gone, the history was
    /// replaced, or a newest-page load superseded it.
    pub fn finish_older_load(
        &mut self,
        conversation: ConversationId,
        generation: u64,
        older: Vec<Message>,
        requested_limit: u32,
    ) -> PageMerge {
        if !self.is_current(conversation, generation) || !self.contains_conversation(conversation) {
            tracing::debug!(conversation = %conversation, generation, "stale history page discarded");
            return PageMerge::Discarded;
        }
        PageMerge::Merged(self.prepend_older_messages(conversation, older, requested_limit))
    }

    /// Clear the in-flight flag after a failed or abandoned fetch. A fetch
    /// that was already superseded leaves the newer one untouched.
    pub fn abort_load(&mut self, conversation: ConversationId, generation: u64) {
        if let Some(cursor) = self.cursors.get_mut(&conversation) {
            if cursor.generation == generation {
                cursor.loading = false;
            }
        }
    }

    fn is_current(&self, conversation: ConversationId, generation: u64) -> bool {
        self.cursors
            .get(&conversation)
            .map_or(false, |c| c.loading && c.generation == generation)
    }
}
