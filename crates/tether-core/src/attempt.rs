//! Connection attempts and the transport seam.
//!
//! The supervisor never talks to a socket directly. It asks a [`Connector`]
//! to start an attempt and keeps the returned [`TransportHandle`] in its
//! single connection slot. Events produced by the attempt come back tagged
//! with the attempt's [`Generation`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ChannelError, Result};

/// Identifies one connection attempt.
///
/// Generations start at 1 and strictly increase over a client's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Wrap a raw generation number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw generation number.
    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The generation currently occupying the supervisor's slot, readable from
/// any thread.
///
/// The supervisor is the only writer. Adapters read it for their fast-path
/// staleness check; the supervisor re-checks admission itself.
#[derive(Debug, Default)]
pub struct CurrentAttempt(AtomicU64);

impl CurrentAttempt {
    /// Create a tracker with no current attempt.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation, if the slot is occupied.
    pub fn get(&self) -> Option<Generation> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            raw => Some(Generation(raw)),
        }
    }

    /// Whether `generation` is the current attempt.
    pub fn is(&self, generation: Generation) -> bool {
        self.0.load(Ordering::SeqCst) == generation.0
    }

    pub(crate) fn set(&self, generation: Option<Generation>) {
        self.0.store(generation.map_or(0, |g| g.0), Ordering::SeqCst);
    }
}

/// Lifecycle of a single attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AttemptState {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Handshake completed; messages can flow.
    Open,
    /// The transport reported a close.
    Closed,
}

/// A low-level event produced by one attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptEvent {
    /// The handshake completed.
    Opened,
    /// The transport closed, optionally with a close code and reason.
    Closed {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason, when the peer sent one.
        reason: Option<String>,
    },
    /// A text frame arrived.
    Message(String),
    /// The transport failed.
    Error(ChannelError),
}

impl AttemptEvent {
    /// Short name used in traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Opened => "open",
            Self::Closed { .. } => "close",
            Self::Message(_) => "message",
            Self::Error(_) => "error",
        }
    }
}

/// The supervisor's handle on one physical connection.
pub trait TransportHandle: Send {
    /// Queue a text frame for sending.
    fn send_text(&self, text: String) -> Result<()>;

    /// Force-close the transport. Must be idempotent.
    fn close(&self);
}

/// Starts physical connection attempts.
pub trait Connector: Send {
    /// The handle type returned for each attempt.
    type Handle: TransportHandle;

    /// Begin an asynchronous handshake with `uri`.
    ///
    /// Events for this attempt must be reported with `generation`. The
    /// connector must not block waiting for the handshake.
    fn open(&mut self, generation: Generation, uri: &str) -> Self::Handle;
}

/// The attempt held in the supervisor's slot.
#[derive(Debug)]
pub struct ConnectionAttempt<H> {
    generation: Generation,
    handle: H,
    state: AttemptState,
}

impl<H: TransportHandle> ConnectionAttempt<H> {
    pub(crate) fn new(generation: Generation, handle: H) -> Self {
        Self {
            generation,
            handle,
            state: AttemptState::Connecting,
        }
    }

    /// The attempt's generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The attempt's lifecycle state.
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// The transport handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub(crate) fn set_state(&mut self, state: AttemptState) {
        self.state = state;
    }

    /// Write a frame if the handshake has completed.
    pub(crate) fn send_text(&self, text: String) -> Result<()> {
        match self.state {
            AttemptState::Open => self.handle.send_text(text),
            AttemptState::Connecting | AttemptState::Closed => Err(ChannelError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_attempt_tracking() {
        let current = CurrentAttempt::new();
        assert_eq!(current.get(), None);
        assert!(!current.is(Generation::new(1)));

        current.set(Some(Generation::new(3)));
        assert_eq!(current.get(), Some(Generation::new(3)));
        assert!(current.is(Generation::new(3)));
        assert!(!current.is(Generation::new(2)));

        current.set(None);
        assert_eq!(current.get(), None);
    }

    #[test]
    fn test_generation_ordering() {
        let first = Generation::new(1);
        assert!(first.next() > first);
        assert_eq!(first.next().get(), 2);
        assert_eq!(first.to_string(), "#1");
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(AttemptEvent::Opened.kind(), "open");
        assert_eq!(AttemptEvent::Message("{}".into()).kind(), "message");
        assert_eq!(
            AttemptEvent::Closed { code: None, reason: None }.kind(),
            "close"
        );
    }
}
