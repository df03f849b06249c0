//! Networking module for Tether.
//!
//! This crate runs the transport-agnostic supervisor from `tether-core` on
//! tokio, over a tokio-tungstenite WebSocket:
//!
//! - **Channel Client**: Public facade: `init`, `send`, `register`, `shutdown`
//! - **Transport**: One task per connection attempt, driving a socket adapter
//! - **Runtime**: The single supervisor task with its heartbeat and reconnect
//!   timers
//!
//! # Channel Client
//!
//! ```ignore
//! use std::time::Duration;
//! use tether_net::{ChannelClient, ClientOptions, InboundMessage};
//!
//! let client = ChannelClient::new();
//!
//! // Handlers match types case-insensitively
//! client.register("User", |msg: &InboundMessage| {
//!     println!("user update: {}", msg.data);
//! });
//!
//! client.init(
//!     "/ws/control",
//!     ClientOptions::new()
//!         .host("example.com")
//!         .secure(true)
//!         .heartbeat_interval(Duration::from_secs(60))
//!         .on_close(|event| println!("closed: {:?}", event.code)),
//! )?;
//!
//! client.send("Login", &serde_json::json!({ "user": "jam" }))?;
//! ```
//!
//! ## Reconnection
//!
//! When the connection closes or fails, a reconnect poll running every
//! `reconnect_interval` starts a new attempt. Each attempt carries a
//! generation number; events from superseded attempts are dropped and their
//! sockets closed.
//!
//! ## Heartbeat
//!
//! Every `heartbeat_interval` an open connection sends `{"type":"ping"}`.
//! The server's `pong` reply is consumed and never reaches handlers.

mod client;
mod runtime;
mod transport;

pub use client::ChannelClient;
pub use transport::{TungsteniteConnector, TungsteniteHandle};

pub use tether_core::{
    ChannelError, ClientOptions, CloseEvent, ConnectionState, ErrorEvent, Generation, HandlerId,
    InboundMessage, MessageEvent, MessageHandler, OpenEvent, OutboundMessage, Result,
};
