//! The channel client facade.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tether_core::logging::targets;
use tether_core::{
    ChannelError, ClientOptions, ConnectionState, CurrentAttempt, Generation, HandlerId,
    HandlerRegistry, MessageHandler, Result, SharedRegistry, Supervisor,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::runtime::{self, Command, SharedSnapshot};
use crate::transport::{self, TungsteniteConnector};

/// Lifecycle of the facade.
#[derive(Default)]
struct ClientInner {
    url: Option<String>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    shut_down: bool,
}

/// A resilient message channel to one server endpoint.
///
/// The client keeps exactly one WebSocket connection alive: it reconnects
/// after failures, sends periodic `{"type":"ping"}` heartbeats, and routes
/// every inbound `{"type": ..., "data": ...}` frame to the handlers
/// registered for its type.
///
/// Transport failures never surface as `Err` from these methods; they are
/// delivered to the `on_error` hook of [`ClientOptions`]. Only API misuse
/// (sending before `init`, initializing twice, using a client after
/// shutdown) is returned directly.
///
/// # Example
///
/// ```no_run
/// use tether_net::{ChannelClient, ClientOptions, InboundMessage};
///
/// # async fn demo() -> tether_net::Result<()> {
/// let client = ChannelClient::new();
/// client.register("MenuItems", |msg: &InboundMessage| {
///     println!("menu: {}", msg.data);
/// });
///
/// client.init(
///     "/ws/control",
///     ClientOptions::new()
///         .port(8000)
///         .header("Cookie", "session=abc")
///         .on_open(|_| println!("connected"))
///         .on_error(|event| eprintln!("channel error: {}", event.error)),
/// )?;
///
/// client.send("GetMenu", &())?;
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ChannelClient {
    registry: SharedRegistry,
    inner: Mutex<ClientInner>,
    snapshot: SharedSnapshot,
}

impl ChannelClient {
    /// Create an uninitialized client with an empty handler registry.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::shared(),
            inner: Mutex::new(ClientInner::default()),
            snapshot: SharedSnapshot::default(),
        }
    }

    /// Bind `handler` to inbound messages of `message_type`.
    ///
    /// Types match case-insensitively. Several handlers may share a type;
    /// they run in registration order. Handlers may be registered before or
    /// after [`init`](Self::init).
    pub fn register<H>(&self, message_type: &str, handler: H) -> HandlerId
    where
        H: MessageHandler + 'static,
    {
        self.registry.write().register(message_type, handler)
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        self.registry.write().unregister(id)
    }

    /// The shared handler registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Configure the channel and start connecting to `path`.
    ///
    /// Must be called from within a tokio runtime. The first connection
    /// attempt starts immediately; the heartbeat and reconnect poll first
    /// fire one full interval later.
    pub fn init(&self, path: &str, options: ClientOptions) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(ChannelError::ShutDown);
        }
        if inner.url.is_some() {
            return Err(ChannelError::AlreadyInitialized);
        }
        let handle = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;

        let url = options.endpoint(path)?;
        transport::build_request(&url, &options.headers)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let current = Arc::new(CurrentAttempt::new());
        let connector = TungsteniteConnector::new(
            handle.clone(),
            runtime::gate(current.clone(), tx.clone()),
            &options,
        );
        let mut supervisor = Supervisor::new(connector, self.registry.clone(), current);
        supervisor.init(path, options)?;

        tracing::info!(target: targets::RUNTIME, url = %url, "channel initialized");
        inner.task = Some(handle.spawn(runtime::run(supervisor, rx, self.snapshot.clone())));
        inner.commands = Some(tx);
        inner.url = Some(url);
        Ok(())
    }

    /// Send a typed message.
    ///
    /// `data` is serialized to JSON; pass `&()` to send a message without
    /// data. Returns `Ok` once the message is queued. If there is no open
    /// connection, or serialization or the write fails, `on_error` fires and
    /// the connection is reset.
    pub fn send<T>(&self, message_type: &str, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let inner = self.inner.lock();
        if inner.shut_down {
            return Err(ChannelError::ShutDown);
        }
        let commands = inner.commands.as_ref().ok_or(ChannelError::NotInitialized)?;
        let command = match serde_json::to_value(data) {
            Ok(data) => Command::Send {
                message_type: message_type.to_string(),
                data,
            },
            Err(e) => Command::Fail(ChannelError::Encode(e.to_string())),
        };
        commands.send(command).map_err(|_| ChannelError::ShutDown)
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.snapshot.lock().state
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Generation of the current connection attempt, if any.
    pub fn generation(&self) -> Option<Generation> {
        self.snapshot.lock().generation
    }

    /// The endpoint URL, once initialized.
    pub fn url(&self) -> Option<String> {
        self.inner.lock().url.clone()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }

    /// Stop both timers, close any connection and wait for the supervisor
    /// task to finish.
    ///
    /// Idempotent. After this returns no further traffic is sent and no hook
    /// fires.
    pub async fn shutdown(&self) {
        let (commands, task) = {
            let mut inner = self.inner.lock();
            if inner.shut_down {
                return;
            }
            inner.shut_down = true;
            (inner.commands.take(), inner.task.take())
        };

        if let Some(commands) = commands {
            let (done_tx, done_rx) = oneshot::channel();
            if commands.send(Command::Shutdown(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(target: targets::RUNTIME, error = %e, "supervisor task failed");
        }
    }
}

impl Default for ChannelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        if let Some(commands) = self.inner.get_mut().commands.take() {
            let (done_tx, _) = oneshot::channel();
            let _ = commands.send(Command::Shutdown(done_tx));
        }
    }
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("url", &self.url())
            .field("state", &self.state())
            .field("handlers", &self.registry.read().len())
            .finish()
    }
}
