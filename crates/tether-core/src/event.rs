//! Lifecycle events delivered to the client's hooks.

use crate::attempt::Generation;
use crate::error::ChannelError;

/// Delivered to `on_open` when an attempt's handshake completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenEvent {
    /// The attempt that opened.
    pub generation: Generation,
}

/// Delivered to `on_close` when the current attempt leaves the slot.
///
/// `code` and `reason` are only present when the peer sent a close frame.
/// An attempt released because of an error or a failed send reports a close
/// without either.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseEvent {
    /// The attempt that closed.
    pub generation: Generation,
    /// WebSocket close code.
    pub code: Option<u16>,
    /// Close reason text.
    pub reason: Option<String>,
}

/// Delivered to `on_message` after the payload has been dispatched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    /// The attempt the frame arrived on.
    pub generation: Generation,
    /// The raw text frame.
    pub payload: String,
}

/// Delivered to `on_error` for every transport-level failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEvent {
    /// The attempt that failed, if one was in the slot.
    pub generation: Option<Generation>,
    /// What went wrong.
    pub error: ChannelError,
}
