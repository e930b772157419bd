use thiserror::Error;

use courier_shared::{ConversationId, ProtocolError};

/// Errors surfaced to the action that initiated a request.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status or envelope.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The push transport is down.
    #[error("Transport not connected")]
    NotConnected,

    /// The outbound transport channel was dropped.
    #[error("Transport channel closed")]
    ChannelClosed,

    /// The outbound transport channel is full; the event was not queued.
    #[error("Transport channel full")]
    ChannelFull,

    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
