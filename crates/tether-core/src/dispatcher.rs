//! Routing of inbound payloads to registered handlers.

use crate::logging::{self, targets};
use crate::protocol::{self, Decoded, HEARTBEAT_REPLY};
use crate::registry::SharedRegistry;

/// What happened to one inbound payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// This many handlers were invoked.
    Handled(usize),
    /// Heartbeat reply, consumed without invoking handlers.
    Heartbeat,
    /// Well-formed message whose type has no handler.
    Unhandled,
    /// JSON object without a `type`; ignored.
    Untyped,
    /// Payload could not be parsed; dropped.
    Malformed,
}

/// Parses inbound payloads and routes them through a [`HandlerRegistry`](crate::HandlerRegistry).
///
/// Nothing here fails: a bad payload is reported and dropped, and a handler
/// that panics is logged and skipped, so a single message can never tear
/// down the connection.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: SharedRegistry,
    debug: bool,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry.
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            debug: false,
        }
    }

    /// Enable debug tracing of every dispatched message.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// The registry this dispatcher routes through.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Parse and route one payload.
    pub fn dispatch(&self, payload: &str) -> DispatchOutcome {
        let message = match protocol::decode(payload) {
            Ok(Decoded::Message(message)) => message,
            Ok(Decoded::Untyped) => return DispatchOutcome::Untyped,
            Err(err) => {
                tracing::warn!(target: targets::DISPATCHER, error = %err, payload, "cannot parse inbound message");
                return DispatchOutcome::Malformed;
            }
        };

        if self.debug {
            tracing::debug!(target: targets::DISPATCHER, message_type = %message.message_type, "dispatching");
        }

        let normalized = message.normalized_type();
        if normalized == HEARTBEAT_REPLY {
            return DispatchOutcome::Heartbeat;
        }

        // Handlers run outside the lock so they may register or unregister.
        let handlers = self.registry.read().handlers_for(&normalized);
        if handlers.is_empty() {
            tracing::warn!(target: targets::DISPATCHER, message_type = %message.message_type, "no handler for message type");
            return DispatchOutcome::Unhandled;
        }

        for handler in &handlers {
            logging::contain_panic(targets::DISPATCHER, "handler", || handler.handle(&message));
        }
        DispatchOutcome::Handled(handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InboundMessage;
    use crate::registry::HandlerRegistry;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(
        registry: &SharedRegistry,
        message_type: &str,
        tag: &'static str,
        log: &Arc<Mutex<Vec<(&'static str, InboundMessage)>>>,
    ) {
        let log = log.clone();
        registry
            .write()
            .register(message_type, move |msg: &InboundMessage| log.lock().push((tag, msg.clone())));
    }

    #[test]
    fn test_case_insensitive_fan_out_in_order() {
        let registry = HandlerRegistry::shared();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&registry, "Foo", "h1", &log);
        recorder(&registry, "foo", "h2", &log);

        let dispatcher = Dispatcher::new(registry);
        let outcome = dispatcher.dispatch(r#"{"type":"FOO","data":{"n":1}}"#);

        assert_eq!(outcome, DispatchOutcome::Handled(2));
        let log = log.lock();
        assert_eq!(log.iter().map(|(tag, _)| *tag).collect::<Vec<_>>(), vec!["h1", "h2"]);
        assert_eq!(log[0].1.message_type, "FOO");
        assert_eq!(log[0].1.data["n"], 1);
    }

    #[test]
    fn test_heartbeat_reply_consumed() {
        let registry = HandlerRegistry::shared();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        registry.write().register("pong", move |_: &InboundMessage| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let dispatcher = Dispatcher::new(registry);
        assert_eq!(dispatcher.dispatch(r#"{"type":"Pong"}"#), DispatchOutcome::Heartbeat);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unhandled_type() {
        let dispatcher = Dispatcher::new(HandlerRegistry::shared());
        assert_eq!(dispatcher.dispatch(r#"{"type":"User"}"#), DispatchOutcome::Unhandled);
    }

    #[test]
    fn test_malformed_and_untyped_payloads() {
        let registry = HandlerRegistry::shared();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&registry, "user", "h", &log);
        let dispatcher = Dispatcher::new(registry);

        assert_eq!(dispatcher.dispatch("{{{"), DispatchOutcome::Malformed);
        assert_eq!(dispatcher.dispatch(r#"{"type":["user"]}"#), DispatchOutcome::Malformed);
        assert_eq!(dispatcher.dispatch(r#"{"data":1}"#), DispatchOutcome::Untyped);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_panicking_handler_does_not_stop_fan_out() {
        let registry = HandlerRegistry::shared();
        let count = Arc::new(AtomicUsize::new(0));
        registry.write().register("boom", |_: &InboundMessage| panic!("handler failed"));
        let count_clone = count.clone();
        registry.write().register("boom", move |_: &InboundMessage| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let dispatcher = Dispatcher::new(registry);
        assert_eq!(dispatcher.dispatch(r#"{"type":"boom"}"#), DispatchOutcome::Handled(2));
        assert_eq!(dispatcher.dispatch(r#"{"type":"boom"}"#), DispatchOutcome::Handled(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_may_register_during_dispatch() {
        let registry = HandlerRegistry::shared();
        let inner = registry.clone();
        registry.write().register("grow", move |_: &InboundMessage| {
            inner.write().register("grow", |_: &InboundMessage| {});
        });

        let dispatcher = Dispatcher::new(registry.clone());
        assert_eq!(dispatcher.dispatch(r#"{"type":"grow"}"#), DispatchOutcome::Handled(1));
        assert_eq!(registry.read().len(), 2);
    }
}
