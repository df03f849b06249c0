//! Observable connection state.

/// Current state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No attempt occupies the slot.
    #[default]
    Idle,
    /// First or manual attempt handshaking.
    Connecting,
    /// Handshake completed; messages can flow.
    Connected,
    /// Attempt started by the reconnect poll is handshaking.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
