//! Pagination Controller.
//!
//! Drives initial and "load older" history fetches against the REST
//! collaborator. The store's cursor carries the in-flight flag, so a second
//! trigger while a fetch is outstanding is a no-op and exhausted history is
//! never requested. A failed fetch leaves the store untouched.

use std::sync::Arc;

use courier_shared::ConversationId;
use courier_store::{PageMerge, PageSlot};

use crate::api::ChatApi;
use crate::error::Result;
use crate::events::{ChangeNotifier, StoreChange};
use crate::state::{lock, SharedStore};

/// Result of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was merged; carries the number of new messages.
    Loaded(usize),
    /// An older-page fetch for this conversation is already running.
    AlreadyLoading,
    /// The server has no older history.
    Exhausted,
    /// The page arrived too late (conversation closed, deleted, resynced or
    /// superseded by a newer fetch) and was dropped.
    Discarded,
}

#[derive(Clone)]
pub struct PaginationController {
    api: Arc<dyn ChatApi>,
    store: SharedStore,
    notifier: ChangeNotifier,
    page_size: u32,
}

impl PaginationController {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: SharedStore,
        notifier: ChangeNotifier,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            page_size,
        }
    }

    /// Fetch the newest page and replace the conversation's history.
    ///
    /// Supersedes any fetch already in flight for the conversation, so a
    /// resync after reconnect is never skipped; the superseded page is
    /// discarded when it lands.
    pub async fn load_initial(&self, conversation: ConversationId) -> Result<LoadOutcome> {
        let generation = lock(&self.store).begin_initial_load(conversation);

        let mut page = match self.api.fetch_messages(conversation, self.page_size, 0).await {
            Ok(page) => page,
            Err(e) => {
                lock(&self.store).abort_load(conversation, generation);
                tracing::warn!(conversation = %conversation, error = %e, "initial history fetch failed");
                return Err(e);
            }
        };
        // Server pages are newest first.
        page.reverse();

        let merge = lock(&self.store).finish_initial_load(conversation, generation, page, self.page_size);
        Ok(match merge {
            PageMerge::Merged(count) => {
                self.notifier
                    .emit(StoreChange::MessagesReplaced { conversation_id: conversation });
                LoadOutcome::Loaded(count)
            }
            PageMerge::Discarded => LoadOutcome::Discarded,
        })
    }

    /// Fetch the next older page and prepend it. Falls back to
    /// [`load_initial`](Self::load_initial) if nothing is loaded yet.
    pub async fn load_more(&self, conversation: ConversationId) -> Result<LoadOutcome> {
        let slot = lock(&self.store).begin_older_load(conversation);
        let (offset, generation) = match slot {
            PageSlot::Ready { offset, generation } => (offset, generation),
            PageSlot::InFlight => return Ok(LoadOutcome::AlreadyLoading),
            PageSlot::Exhausted => return Ok(LoadOutcome::Exhausted),
            PageSlot::Unloaded => return self.load_initial(conversation).await,
        };

        tracing::debug!(conversation = %conversation, offset, limit = self.page_size, "loading older messages");
        let mut page = match self
            .api
            .fetch_messages(conversation, self.page_size, offset)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                lock(&self.store).abort_load(conversation, generation);
                tracing::warn!(conversation = %conversation, error = %e, "history fetch failed");
                return Err(e);
            }
        };
        page.reverse();

        let merge = {
            let mut store = lock(&self.store);
            if store.selected_conversation() != Some(conversation) {
                store.abort_load(conversation, generation);
                PageMerge::Discarded
            } else {
                store.finish_older_load(conversation, generation, page, self.page_size)
            }
        };

        Ok(match merge {
            PageMerge::Merged(count) => {
                self.notifier.emit(StoreChange::OlderMessagesLoaded {
                    conversation_id: conversation,
                    count,
                });
                LoadOutcome::Loaded(count)
            }
            PageMerge::Discarded => {
                tracing::debug!(conversation = %conversation, "late history page dropped");
                LoadOutcome::Discarded
            }
        })
    }
}
