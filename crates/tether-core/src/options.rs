//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{ChannelError, Result};
use crate::event::{CloseEvent, ErrorEvent, MessageEvent, OpenEvent};
use crate::logging::{self, targets};

/// Default interval between heartbeat requests.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(8 * 60);

/// Default interval between reconnect polls.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default host when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// A lifecycle hook.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Configuration for a channel client.
///
/// Every field has a default; the builder methods override only what they
/// touch.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_core::ClientOptions;
///
/// let options = ClientOptions::new()
///     .host("example.com")
///     .port(8443)
///     .secure(true)
///     .heartbeat_interval(Duration::from_secs(60))
///     .on_open(|event| println!("open {}", event.generation));
///
/// assert_eq!(options.endpoint("/ws/control").unwrap(), "wss://example.com:8443/ws/control");
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    /// Server host.
    pub host: String,
    /// Server port. `None` uses the scheme's default port.
    pub port: Option<u16>,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
    /// Reconnect automatically after the connection is lost.
    pub auto_reconnect: bool,
    /// Interval between heartbeat requests.
    pub heartbeat_interval: Duration,
    /// Interval between reconnect polls.
    pub reconnect_interval: Duration,
    /// Handshake timeout. `None` waits for the operating system to give up.
    pub connect_timeout: Option<Duration>,
    /// Emit lifecycle traces.
    pub debug: bool,
    /// Extra headers sent with the handshake (for example a session cookie).
    pub headers: Vec<(String, String)>,
    /// Called when an attempt opens.
    pub on_open: Option<Callback<OpenEvent>>,
    /// Called when the current attempt closes or is released.
    pub on_close: Option<Callback<CloseEvent>>,
    /// Called for every admitted text frame, after dispatch.
    pub on_message: Option<Callback<MessageEvent>>,
    /// Called for every transport-level failure.
    ///
    /// A hook that panics is logged and otherwise ignored.
    pub on_error: Option<Callback<ErrorEvent>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            secure: false,
            auto_reconnect: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            debug: false,
            headers: Vec::new(),
            on_open: None,
            on_close: None,
            on_message: None,
            on_error: None,
        }
    }
}

impl ClientOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Select the secure scheme.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Enable or disable automatic reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the reconnect poll interval.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Disable the handshake timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Enable lifecycle traces.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Add a handshake header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the open hook.
    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OpenEvent) + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(hook));
        self
    }

    /// Set the close hook.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(hook));
        self
    }

    /// Set the message hook.
    pub fn on_message<F>(mut self, hook: F) -> Self
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(hook));
        self
    }

    /// Set the error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// The URI scheme selected by [`secure`](Self::secure).
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Compose `scheme://host[:port]path` and validate it.
    pub fn endpoint(&self, path: &str) -> Result<String> {
        if self.host.is_empty() {
            return Err(ChannelError::InvalidUrl("empty host".into()));
        }
        if !path.is_empty() && !path.starts_with('/') {
            return Err(ChannelError::InvalidUrl(format!(
                "path must start with '/': {path}"
            )));
        }
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let uri = format!("{}://{}{}{}", self.scheme(), self.host, port, path);
        Url::parse(&uri)?;
        Ok(uri)
    }

    pub(crate) fn emit_open(&self, event: OpenEvent) {
        if let Some(hook) = &self.on_open {
            logging::contain_panic(targets::SUPERVISOR, "on_open", || hook(&event));
        }
    }

    pub(crate) fn emit_close(&self, event: CloseEvent) {
        if let Some(hook) = &self.on_close {
            logging::contain_panic(targets::SUPERVISOR, "on_close", || hook(&event));
        }
    }

    pub(crate) fn emit_message(&self, event: MessageEvent) {
        if let Some(hook) = &self.on_message {
            logging::contain_panic(targets::SUPERVISOR, "on_message", || hook(&event));
        }
    }

    pub(crate) fn emit_error(&self, event: ErrorEvent) {
        if let Some(hook) = &self.on_error {
            logging::contain_panic(targets::SUPERVISOR, "on_error", || hook(&event));
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("debug", &self.debug)
            .field("headers", &self.headers.len())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
