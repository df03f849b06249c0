//! Error types for Tether channels.

use thiserror::Error;

/// Errors surfaced by a channel client.
///
/// Transport and protocol failures never escalate past the client; they are
/// delivered to the `on_error` hook inside an [`ErrorEvent`](crate::ErrorEvent).
/// Only API misuse is returned directly from facade calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// `init` was called on a client that is already initialized.
    #[error("Channel has already been initialized")]
    AlreadyInitialized,
    /// An operation that needs a running channel was called before `init`.
    #[error("Channel has not been initialized")]
    NotInitialized,
    /// The composed endpoint URI could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Invalid handshake header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// No open transport to write to.
    #[error("Not connected")]
    NotConnected,
    /// Connect failure, socket error or write failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// An outbound message could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),
    /// An inbound payload could not be parsed.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The channel has been shut down.
    #[error("Channel has been shut down")]
    ShutDown,
    /// `init` was called outside of a tokio runtime.
    #[error("No async runtime available")]
    NoRuntime,
}

impl ChannelError {
    /// Whether this error belongs to the connection-lost path.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_) | Self::Encode(_))
    }
}

impl From<url::ParseError> for ChannelError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// A specialized Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
