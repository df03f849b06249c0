//! Logging facilities for Tether.
//!
//! Tether uses the `tracing` crate for instrumentation. To see logs, install a
//! subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! Lifecycle traces (connect, open, close, reset, send, timer ticks) are only
//! emitted when [`ClientOptions::debug`](crate::ClientOptions::debug) is set.
//! Malformed payloads and unhandled message types are always logged at `warn`.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "tether_core";
    /// Connection supervisor target.
    pub const SUPERVISOR: &str = "tether_core::supervisor";
    /// Message dispatcher target.
    pub const DISPATCHER: &str = "tether_core::dispatcher";
    /// Raw socket adapter target.
    pub const ADAPTER: &str = "tether_core::adapter";
    /// WebSocket transport target.
    pub const TRANSPORT: &str = "tether_net::transport";
    /// Supervisor task and timers target.
    pub const RUNTIME: &str = "tether_net::runtime";
}

/// Run user code, logging a panic at `warn` on `target` instead of
/// unwinding into the caller. Returns `false` if `f` panicked.
pub(crate) fn contain_panic(target: &'static str, what: &str, f: impl FnOnce()) -> bool {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            match target {
                targets::DISPATCHER => {
                    tracing::warn!(target: targets::DISPATCHER, what, panic = %message, "callback panicked")
                }
                _ => {
                    tracing::warn!(target: targets::SUPERVISOR, what, panic = %message, "callback panicked")
                }
            }
            false
        }
    }
}
