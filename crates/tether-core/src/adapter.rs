//! Guard around one physical connection attempt.
//!
//! A [`SocketAdapter`] sits between a transport's native callbacks and the
//! supervisor. It forwards an event only while its attempt is still the
//! current one. Once it notices it has been superseded it neutralizes its
//! event slots and, unless the event was a close, force-closes its
//! transport so an orphaned socket cannot keep chattering.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::attempt::{AttemptEvent, CurrentAttempt, Generation, TransportHandle};
use crate::error::ChannelError;
use crate::logging::targets;

/// Capability handed to each adapter by the supervisor side.
pub trait AttemptGate: Send + Sync {
    /// Whether `generation` is still the supervisor's current attempt.
    fn is_current(&self, generation: Generation) -> bool;

    /// Deliver an event for admission by the supervisor.
    fn report(&self, generation: Generation, event: AttemptEvent);
}

/// Gate that answers `is_current` from a shared [`CurrentAttempt`] and
/// forwards reports to a closure.
pub struct TrackedGate<F> {
    current: Arc<CurrentAttempt>,
    sink: F,
}

impl<F> TrackedGate<F>
where
    F: Fn(Generation, AttemptEvent) + Send + Sync,
{
    /// Create a gate over `current` that reports into `sink`.
    pub fn new(current: Arc<CurrentAttempt>, sink: F) -> Self {
        Self { current, sink }
    }
}

impl<F> AttemptGate for TrackedGate<F>
where
    F: Fn(Generation, AttemptEvent) + Send + Sync,
{
    fn is_current(&self, generation: Generation) -> bool {
        self.current.is(generation)
    }

    fn report(&self, generation: Generation, event: AttemptEvent) {
        (self.sink)(generation, event)
    }
}

/// Event guard for one attempt.
pub struct SocketAdapter<H> {
    generation: Generation,
    handle: H,
    gate: Arc<dyn AttemptGate>,
    neutralized: AtomicBool,
}

impl<H: TransportHandle> SocketAdapter<H> {
    /// Wire an adapter for `generation` around `handle`.
    pub fn new(generation: Generation, handle: H, gate: Arc<dyn AttemptGate>) -> Self {
        Self {
            generation,
            handle,
            gate,
            neutralized: AtomicBool::new(false),
        }
    }

    /// The attempt's generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The wrapped transport handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Whether the event slots have been neutralized.
    pub fn is_neutralized(&self) -> bool {
        self.neutralized.load(Ordering::SeqCst)
    }

    /// Open slot.
    pub fn on_open(&self) {
        self.deliver(AttemptEvent::Opened);
    }

    /// Close slot.
    pub fn on_close(&self, code: Option<u16>, reason: Option<String>) {
        self.deliver(AttemptEvent::Closed { code, reason });
    }

    /// Message slot.
    pub fn on_message(&self, payload: String) {
        self.deliver(AttemptEvent::Message(payload));
    }

    /// Error slot.
    pub fn on_error(&self, error: ChannelError) {
        self.deliver(AttemptEvent::Error(error));
    }

    /// Detach from the supervisor. Idempotent.
    pub fn neutralize(&self) {
        self.neutralized.store(true, Ordering::SeqCst);
    }

    fn deliver(&self, event: AttemptEvent) {
        if self.is_neutralized() {
            return;
        }
        if self.gate.is_current(self.generation) {
            self.gate.report(self.generation, event);
            return;
        }

        tracing::trace!(
            target: targets::ADAPTER,
            generation = %self.generation,
            event = event.kind(),
            "event from superseded attempt, detaching"
        );
        self.neutralize();
        // A stale close needs no forced close; the transport is already down.
        if !matches!(event, AttemptEvent::Closed { .. }) {
            self.handle.close();
        }
    }
}

impl<H> std::fmt::Debug for SocketAdapter<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketAdapter")
            .field("generation", &self.generation)
            .field("neutralized", &self.neutralized.load(Ordering::SeqCst))
            .finish()
    }
}
