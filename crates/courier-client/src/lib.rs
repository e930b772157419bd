//! # courier-client
//!
//! Real-time message synchronisation core for the Courier chat client.
//!
//! A [`ChatSession`] ties together the REST collaborator ([`api::ChatApi`]),
//! the push transport ports ([`transport`]), the [`reconciler::Reconciler`]
//! loop, the [`pagination::PaginationController`] and outgoing sends, all
//! mutating one shared [`courier_store::MessageStore`].

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod outbox;
pub mod pagination;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod transport;
pub mod typing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::StoreChange;
pub use session::ChatSession;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courier_client=debug,courier_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    tracing::info!("{} client v{}", courier_shared::constants::APP_NAME, env!("CARGO_PKG_VERSION"));
}
