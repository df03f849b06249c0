//! Handler registry for inbound message types.
//!
//! Bindings are kept in registration order, which is also the order in which
//! the dispatcher invokes them. Several handlers may be bound to the same
//! type; all of them run.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::{InboundMessage, normalize_type};

/// A callback invoked for inbound messages of a registered type.
///
/// Implemented for every `Fn(&InboundMessage) + Send + Sync` closure.
pub trait MessageHandler: Send + Sync {
    /// Handle one inbound message.
    fn handle(&self, message: &InboundMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(&InboundMessage) + Send + Sync,
{
    fn handle(&self, message: &InboundMessage) {
        self(message)
    }
}

/// Identifier returned by [`HandlerRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// One (type, handler) binding.
#[derive(Clone)]
pub struct HandlerBinding {
    id: HandlerId,
    message_type: String,
    handler: Arc<dyn MessageHandler>,
}

impl HandlerBinding {
    /// The binding's identifier.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// The normalized (lowercase) message type.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

impl std::fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("id", &self.id)
            .field("message_type", &self.message_type)
            .finish()
    }
}

/// Ordered set of handler bindings.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    bindings: Vec<HandlerBinding>,
    next_id: u64,
}

/// A registry shared between the client facade and the dispatcher.
pub type SharedRegistry = Arc<RwLock<HandlerRegistry>>;

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry wrapped for sharing.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Append a binding. The type is matched case-insensitively.
    pub fn register<H>(&mut self, message_type: &str, handler: H) -> HandlerId
    where
        H: MessageHandler + 'static,
    {
        self.register_arc(message_type, Arc::new(handler))
    }

    /// Append a binding for an already shared handler.
    pub fn register_arc(
        &mut self,
        message_type: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.bindings.push(HandlerBinding {
            id,
            message_type: normalize_type(message_type),
            handler,
        });
        id
    }

    /// Remove a binding. Returns `true` if it was present.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|binding| binding.id != id);
        self.bindings.len() != before
    }

    /// Handlers bound to `message_type`, in registration order.
    pub fn handlers_for(&self, message_type: &str) -> Vec<Arc<dyn MessageHandler>> {
        let wanted = normalize_type(message_type);
        self.bindings
            .iter()
            .filter(|binding| binding.message_type == wanted)
            .map(|binding| binding.handler.clone())
            .collect()
    }

    /// All bindings, in registration order.
    pub fn bindings(&self) -> &[HandlerBinding] {
        &self.bindings
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the registry has no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
