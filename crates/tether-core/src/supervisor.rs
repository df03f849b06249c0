//! The connection supervisor.
//!
//! [`Supervisor`] owns the single connection slot of a channel. It decides
//! when to connect, admits or rejects attempt events by generation, and
//! reacts to the two periodic ticks (reconnect poll and heartbeat) that the
//! runtime feeds it.
//!
//! The supervisor is a plain state machine: every method runs to completion
//! and nothing in it blocks or spawns. Callers must serialize access to it;
//! `tether-net` does so by owning it inside a single task.
//!
//! # Admission
//!
//! An event reported for generation `g` is admitted only if the slot holds
//! the attempt with generation `g`. Every attempt that leaves the slot has
//! its transport force-closed at that moment, so events from it that are
//! still in flight are simply dropped here.
//!
//! # Example
//!
//! ```ignore
//! let current = Arc::new(CurrentAttempt::new());
//! let mut supervisor = Supervisor::new(connector, HandlerRegistry::shared(), current);
//! supervisor.init("/ws/control", ClientOptions::new().port(8000))?;
//!
//! supervisor.handle_event(Generation::new(1), AttemptEvent::Opened);
//! supervisor.heartbeat_tick();   // sends {"type":"ping"}
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::attempt::{
    AttemptEvent, AttemptState, ConnectionAttempt, Connector, CurrentAttempt, Generation,
    TransportHandle,
};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{ChannelError, Result};
use crate::event::{CloseEvent, ErrorEvent, MessageEvent, OpenEvent};
use crate::logging::targets;
use crate::options::ClientOptions;
use crate::protocol::{HEARTBEAT_REQUEST, OutboundMessage};
use crate::registry::SharedRegistry;
use crate::state::ConnectionState;

/// Owns the connection slot and drives reconnection and heartbeats.
pub struct Supervisor<C: Connector> {
    connector: C,
    options: ClientOptions,
    uri: Option<String>,
    dispatcher: Dispatcher,
    current: Arc<CurrentAttempt>,
    slot: Option<ConnectionAttempt<C::Handle>>,
    last_generation: Generation,
    reconnecting: bool,
    shut_down: bool,
}

impl<C: Connector> Supervisor<C> {
    /// Create an uninitialized supervisor.
    ///
    /// `current` is updated whenever the slot changes; hand the same tracker
    /// to the connector's gates so adapters can check staleness.
    pub fn new(connector: C, registry: SharedRegistry, current: Arc<CurrentAttempt>) -> Self {
        current.set(None);
        Self {
            connector,
            options: ClientOptions::default(),
            uri: None,
            dispatcher: Dispatcher::new(registry),
            current,
            slot: None,
            last_generation: Generation::new(0),
            reconnecting: false,
            shut_down: false,
        }
    }

    /// Store the configuration and make the first connection attempt.
    pub fn init(&mut self, path: &str, options: ClientOptions) -> Result<()> {
        if self.shut_down {
            return Err(ChannelError::ShutDown);
        }
        if self.uri.is_some() {
            return Err(ChannelError::AlreadyInitialized);
        }
        let uri = options.endpoint(path)?;
        self.dispatcher.set_debug(options.debug);
        self.options = options;
        self.uri = Some(uri);
        self.trace("init");
        self.connect();
        Ok(())
    }

    /// Whether [`init`](Self::init) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.uri.is_some()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The endpoint URI, once initialized.
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// The active configuration.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The attempt in the slot, if any.
    pub fn attempt(&self) -> Option<&ConnectionAttempt<C::Handle>> {
        self.slot.as_ref()
    }

    /// Generation of the attempt in the slot.
    pub fn generation(&self) -> Option<Generation> {
        self.slot.as_ref().map(|attempt| attempt.generation())
    }

    /// The most recently issued generation (0 before the first attempt).
    pub fn last_generation(&self) -> Generation {
        self.last_generation
    }

    /// Whether the reconnect poll started the attempt in progress.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// The connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Observable connection state.
    pub fn state(&self) -> ConnectionState {
        match self.slot.as_ref().map(|attempt| attempt.state()) {
            None | Some(AttemptState::Closed) => ConnectionState::Idle,
            Some(AttemptState::Open) => ConnectionState::Connected,
            Some(AttemptState::Connecting) if self.reconnecting => ConnectionState::Reconnecting,
            Some(AttemptState::Connecting) => ConnectionState::Connecting,
        }
    }

    /// Start a new attempt unless the slot is occupied.
    pub fn connect(&mut self) {
        if self.shut_down || self.slot.is_some() {
            return;
        }
        let Some(uri) = self.uri.clone() else {
            return;
        };

        let generation = self.last_generation.next();
        self.last_generation = generation;
        self.current.set(Some(generation));
        if self.options.debug {
            tracing::debug!(target: targets::SUPERVISOR, %generation, uri, "connecting");
        }
        let handle = self.connector.open(generation, &uri);
        self.slot = Some(ConnectionAttempt::new(generation, handle));
    }

    /// Admit or reject one attempt event. Returns whether it was admitted.
    pub fn handle_event(&mut self, generation: Generation, event: AttemptEvent) -> bool {
        if self.shut_down || self.generation() != Some(generation) {
            tracing::trace!(
                target: targets::SUPERVISOR,
                %generation,
                event = event.kind(),
                "dropping event from superseded attempt"
            );
            return false;
        }
        if self.options.debug {
            tracing::debug!(target: targets::SUPERVISOR, %generation, event = event.kind(), "admitted");
        }

        match event {
            AttemptEvent::Opened => {
                self.reconnecting = false;
                if let Some(attempt) = self.slot.as_mut() {
                    attempt.set_state(AttemptState::Open);
                }
                self.options.emit_open(OpenEvent { generation });
            }
            AttemptEvent::Message(payload) => {
                self.reconnecting = false;
                let outcome = self.dispatcher.dispatch(&payload);
                if self.options.debug && outcome != DispatchOutcome::Malformed {
                    tracing::debug!(target: targets::SUPERVISOR, ?outcome, "dispatched");
                }
                self.options.emit_message(MessageEvent {
                    generation,
                    payload,
                });
            }
            AttemptEvent::Closed { code, reason } => {
                self.reconnecting = false;
                if let Some(attempt) = self.slot.as_mut() {
                    attempt.set_state(AttemptState::Closed);
                }
                // The hook runs while the closed attempt is still in the slot.
                self.options.emit_close(CloseEvent {
                    generation,
                    code,
                    reason,
                });
                self.take_slot();
            }
            AttemptEvent::Error(error) => {
                self.reconnecting = false;
                self.release();
                self.options.emit_error(ErrorEvent {
                    generation: Some(generation),
                    error,
                });
            }
        }
        true
    }

    /// Reconnect poll: connect if the slot is free and auto-reconnect is on.
    pub fn reconnect_tick(&mut self) {
        if self.shut_down || self.slot.is_some() || !self.is_initialized() {
            return;
        }
        if self.options.auto_reconnect && !self.reconnecting {
            self.reconnecting = true;
            self.trace("reconnecting");
            self.connect();
        }
    }

    /// Heartbeat: send a ping if the current attempt is open.
    ///
    /// An attempt that is still handshaking is left alone.
    pub fn heartbeat_tick(&mut self) {
        if self.shut_down {
            return;
        }
        let open = matches!(
            self.slot.as_ref().map(|attempt| attempt.state()),
            Some(AttemptState::Open)
        );
        if open {
            self.send(HEARTBEAT_REQUEST, Value::Null);
        }
    }

    /// Serialize and write a message to the open transport.
    ///
    /// Any failure takes the [`fail`](Self::fail) path.
    pub fn send(&mut self, message_type: &str, data: Value) {
        if self.shut_down {
            return;
        }
        let message = OutboundMessage::new(message_type, data);
        let written = message.encode().and_then(|text| {
            if self.options.debug {
                tracing::debug!(target: targets::SUPERVISOR, frame = %text, "send");
            }
            match self.slot.as_ref() {
                Some(attempt) => attempt.send_text(text),
                None => Err(ChannelError::NotConnected),
            }
        });
        if let Err(error) = written {
            self.fail(error);
        }
    }

    /// Report a transport-level failure and reset the slot.
    pub fn fail(&mut self, error: ChannelError) {
        if self.shut_down {
            return;
        }
        if self.options.debug {
            tracing::debug!(target: targets::SUPERVISOR, %error, "transport failure");
        }
        self.options.emit_error(ErrorEvent {
            generation: self.generation(),
            error,
        });
        self.reset();
    }

    /// Release an occupied slot, or connect immediately if it is empty.
    pub fn reset(&mut self) {
        self.trace("reset");
        self.reconnecting = false;
        if self.slot.is_some() {
            self.release();
        } else {
            self.connect();
        }
    }

    /// Close any transport and stop reacting to ticks, sends and events.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.trace("shutdown");
        self.release();
        self.reconnecting = false;
        self.shut_down = true;
    }

    /// Release the slot and report the close of the released attempt.
    fn release(&mut self) {
        if let Some(attempt) = self.take_slot() {
            self.options.emit_close(CloseEvent {
                generation: attempt.generation(),
                code: None,
                reason: None,
            });
        }
    }

    /// Empty the slot and force-close the attempt that occupied it.
    fn take_slot(&mut self) -> Option<ConnectionAttempt<C::Handle>> {
        let attempt = self.slot.take()?;
        self.current.set(None);
        attempt.handle().close();
        Some(attempt)
    }

    fn trace(&self, what: &'static str) {
        if self.options.debug {
            tracing::debug!(target: targets::SUPERVISOR, generation = ?self.generation(), what);
        }
    }
}

impl<C: Connector> std::fmt::Debug for Supervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("uri", &self.uri)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("reconnecting", &self.reconnecting)
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
