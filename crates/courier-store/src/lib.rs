//! # courier-store
//!
//! In-memory Message Store for the Courier client.
//!
//! A single [`MessageStore`] owns every conversation, message list,
//! pagination cursor and typing set for the session. All mutations are
//! synchronous and total: unknown or duplicate ids are tolerated as no-ops.
//! The conversation list projection is recomputed after every mutation that
//! can affect ordering.

pub mod conversations;
pub mod cursor;
pub mod messages;
pub mod models;
pub mod projection;
pub mod store;
pub mod typing;

pub use cursor::{PageMerge, PageSlot};
pub use models::*;
pub use projection::ConversationSummary;
pub use store::MessageStore;
