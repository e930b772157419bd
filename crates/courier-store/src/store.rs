//! Message Store ownership and session-level state.
//!
//! The [`MessageStore`] owns every conversation, message list, pagination
//! cursor and typing set of one client session. Operations are split across
//! modules by concern (`conversations`, `messages`, `cursor`, `typing`,
//! `projection`), each adding an `impl MessageStore` block.

use std::collections::{HashMap, HashSet};

use courier_shared::{ConnectionState, ConversationId, UserId};

use crate::models::{Conversation, Message, PaginationCursor};

/// Single source of truth for conversations, messages, pagination and
/// typing state.
#[derive(Debug, Default)]
pub struct MessageStore {
    pub(crate) conversations: HashMap<ConversationId, Conversation>,
    /// Conversation ids, most recently active first.
    pub(crate) order: Vec<ConversationId>,
    /// Per-conversation messages, ascending by `created_at`.
    pub(crate) messages: HashMap<ConversationId, Vec<Message>>,
    pub(crate) cursors: HashMap<ConversationId, PaginationCursor>,
    pub(crate) typing: HashMap<ConversationId, HashSet<UserId>>,
    pub(crate) selected: Option<ConversationId>,
    pub(crate) connection: ConnectionState,
    /// When set, status updates never move a message backwards
    /// (`read` does not regress to `delivered`).
    pub(crate) monotonic_status: bool,
    /// Source of pagination cursor generations, unique for the session.
    pub(crate) fetch_generation: u64,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the monotonic status guard enabled or not.
    pub fn with_monotonic_status(monotonic_status: bool) -> Self {
        Self {
            monotonic_status,
            ..Self::default()
        }
    }

    pub fn monotonic_status(&self) -> bool {
        self.monotonic_status
    }

    /// Drop all session data. Used at logout.
    pub fn clear(&mut self) {
        let monotonic_status = self.monotonic_status;
        *self = Self::with_monotonic_status(monotonic_status);
        tracing::debug!("message store cleared");
    }

    // -- selection ----------------------------------------------------------

    /// Mark `id` as the currently open conversation.
    pub fn select_conversation(&mut self, id: ConversationId) {
        self.selected = Some(id);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_conversation(&self) -> Option<ConversationId> {
        self.selected
    }

    pub fn is_selected(&self, id: ConversationId) -> bool {
        self.selected == Some(id)
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.fetch_generation = self.fetch_generation.wrapping_add(1);
        self.fetch_generation
    }

    // -- connectivity -------------------------------------------------------

    /// Record the push transport state. Returns the previous state.
    pub fn set_connection_state(&mut self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut self.connection, state)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }
}
