//! Core systems for Tether.
//!
//! This crate holds the transport-agnostic half of a resilient persistent
//! connection client:
//!
//! - **Supervisor**: Owns the single connection slot, admits attempt events by
//!   generation, drives reconnect polling and heartbeats
//! - **Socket Adapter**: Per-attempt guard that detaches and force-closes
//!   superseded transports
//! - **Dispatcher**: Parses inbound frames and routes them by type
//! - **Handler Registry**: Ordered, case-insensitive (type, handler) bindings
//! - **Protocol**: The `{"type": ..., "data": ...}` frame format
//!
//! The async runtime and the WebSocket transport live in `tether-net`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether_core::{
//!     AttemptEvent, ClientOptions, Connector, ConnectionState, CurrentAttempt, Generation,
//!     HandlerRegistry, InboundMessage, Result, Supervisor, TransportHandle,
//! };
//!
//! struct NullHandle;
//!
//! impl TransportHandle for NullHandle {
//!     fn send_text(&self, _text: String) -> Result<()> {
//!         Ok(())
//!     }
//!     fn close(&self) {}
//! }
//!
//! struct NullConnector;
//!
//! impl Connector for NullConnector {
//!     type Handle = NullHandle;
//!     fn open(&mut self, _generation: Generation, _uri: &str) -> NullHandle {
//!         NullHandle
//!     }
//! }
//!
//! let registry = HandlerRegistry::shared();
//! registry.write().register("user", |msg: &InboundMessage| {
//!     println!("user update: {}", msg.data);
//! });
//!
//! let mut supervisor =
//!     Supervisor::new(NullConnector, registry, Arc::new(CurrentAttempt::new()));
//! supervisor.init("/ws/control", ClientOptions::new().port(8000)).unwrap();
//! supervisor.handle_event(Generation::new(1), AttemptEvent::Opened);
//! assert_eq!(supervisor.state(), ConnectionState::Connected);
//!
//! supervisor.handle_event(
//!     Generation::new(1),
//!     AttemptEvent::Message(r#"{"type":"User","data":{"name":"jam"}}"#.into()),
//! );
//! ```

mod adapter;
mod attempt;
mod dispatcher;
mod error;
mod event;
pub mod logging;
mod options;
pub mod protocol;
mod registry;
mod state;
mod supervisor;

pub use adapter::{AttemptGate, SocketAdapter, TrackedGate};
pub use attempt::{
    AttemptEvent, AttemptState, ConnectionAttempt, Connector, CurrentAttempt, Generation,
    TransportHandle,
};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ChannelError, Result};
pub use event::{CloseEvent, ErrorEvent, MessageEvent, OpenEvent};
pub use options::{
    Callback, ClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HOST,
    DEFAULT_RECONNECT_INTERVAL,
};
pub use protocol::{InboundMessage, OutboundMessage};
pub use registry::{HandlerBinding, HandlerId, HandlerRegistry, MessageHandler, SharedRegistry};
pub use state::ConnectionState;
pub use supervisor::Supervisor;
