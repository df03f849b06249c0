//! WebSocket transport built on tokio-tungstenite.
//!
//! Each connection attempt runs on its own task. The task performs the
//! handshake, then pumps frames between the socket and a [`SocketAdapter`]
//! until the peer closes, the socket fails, or the supervisor force-closes
//! the attempt through its [`TungsteniteHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tether_core::logging::targets;
use tether_core::{
    AttemptGate, ChannelError, ClientOptions, Connector, Generation, Result, SocketAdapter,
    TransportHandle,
};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Type alias for a connected WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command sent to an attempt task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Starts one tokio task per connection attempt.
pub struct TungsteniteConnector {
    runtime: Handle,
    gate: Arc<dyn AttemptGate>,
    headers: Vec<(String, String)>,
    connect_timeout: Option<Duration>,
    debug: bool,
}

impl TungsteniteConnector {
    /// Create a connector that spawns attempts on `runtime` and reports
    /// their events through `gate`.
    pub fn new(runtime: Handle, gate: Arc<dyn AttemptGate>, options: &ClientOptions) -> Self {
        Self {
            runtime,
            gate,
            headers: options.headers.clone(),
            connect_timeout: options.connect_timeout,
            debug: options.debug,
        }
    }
}

impl Connector for TungsteniteConnector {
    type Handle = TungsteniteHandle;

    fn open(&mut self, generation: Generation, uri: &str) -> TungsteniteHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = TungsteniteHandle {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let adapter = SocketAdapter::new(generation, handle.clone(), self.gate.clone());
        let attempt = Attempt {
            adapter,
            uri: uri.to_string(),
            headers: self.headers.clone(),
            connect_timeout: self.connect_timeout,
            debug: self.debug,
        };
        self.runtime.spawn(attempt.run(rx));
        handle
    }
}

impl std::fmt::Debug for TungsteniteConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteConnector")
            .field("headers", &self.headers.len())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// The supervisor's handle on one attempt task.
#[derive(Clone, Debug)]
pub struct TungsteniteHandle {
    tx: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl TungsteniteHandle {
    /// Whether [`close`](TransportHandle::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TransportHandle for TungsteniteHandle {
    fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(ChannelError::NotConnected);
        }
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| ChannelError::Transport("connection task has ended".into()))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

/// Everything an attempt task needs.
struct Attempt {
    adapter: SocketAdapter<TungsteniteHandle>,
    uri: String,
    headers: Vec<(String, String)>,
    connect_timeout: Option<Duration>,
    debug: bool,
}

impl Attempt {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        let generation = self.adapter.generation();

        let request = match build_request(&self.uri, &self.headers) {
            Ok(request) => request,
            Err(e) => {
                self.adapter.on_error(e);
                return;
            }
        };

        let stream = tokio::select! {
            result = handshake(request, self.connect_timeout) => match result {
                Ok(stream) => stream,
                Err(e) => {
                    if self.debug {
                        tracing::debug!(target: targets::TRANSPORT, %generation, error = %e, "handshake failed");
                    }
                    self.adapter.on_error(e);
                    return;
                }
            },
            _ = closed_before_open(&mut rx) => {
                tracing::trace!(target: targets::TRANSPORT, %generation, "handshake abandoned");
                return;
            }
        };

        self.adapter.on_open();
        self.pump(stream, rx).await;

        if self.debug {
            tracing::debug!(target: targets::TRANSPORT, %generation, "attempt finished");
        }
    }

    async fn pump(&self, stream: WsStream, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        let (mut write, mut read) = stream.split();

        while !self.adapter.is_neutralized() {
            tokio::select! {
                // Commands from the supervisor
                command = rx.recv() => match command {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            self.adapter.on_error(ChannelError::Transport(e.to_string()));
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },

                // Frames from the server
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.adapter.on_message(text.to_string());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => {
                                let reason = frame.reason.as_str();
                                let reason = (!reason.is_empty()).then(|| reason.to_string());
                                (Some(u16::from(frame.code)), reason)
                            }
                            None => (None, None),
                        };
                        self.adapter.on_close(code, reason);
                        // Flush tungstenite's queued close reply.
                        let _ = write.close().await;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and control frames; pings are answered by tungstenite
                    }
                    Some(Err(e)) => {
                        self.adapter.on_error(ChannelError::Transport(e.to_string()));
                        break;
                    }
                    None => {
                        self.adapter.on_close(None, None);
                        break;
                    }
                },
            }
        }
    }
}

/// Resolves once the supervisor abandons a handshake.
async fn closed_before_open(rx: &mut mpsc::UnboundedReceiver<Outbound>) {
    while let Some(command) = rx.recv().await {
        if matches!(command, Outbound::Close) {
            return;
        }
    }
}

async fn handshake(request: Request, timeout: Option<Duration>) -> Result<WsStream> {
    let connecting = tokio_tungstenite::connect_async(request);
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| ChannelError::Transport(format!("handshake timed out after {limit:?}")))?,
        None => connecting.await,
    };
    let (stream, _response) = result.map_err(|e| ChannelError::Transport(e.to_string()))?;
    Ok(stream)
}

/// Build the WebSocket request with custom headers.
pub(crate) fn build_request(uri: &str, headers: &[(String, String)]) -> Result<Request> {
    let mut request = uri
        .into_client_request()
        .map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;

    let map = request.headers_mut();
    for (name, value) in headers {
        let header_name = http::header::HeaderName::try_from(name.as_str())
            .map_err(|e| ChannelError::InvalidHeader(e.to_string()))?;
        let header_value = http::header::HeaderValue::try_from(value.as_str())
            .map_err(|e| ChannelError::InvalidHeader(e.to_string()))?;
        map.append(header_name, header_value);
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_adds_headers() {
        let headers = vec![
            ("Cookie".to_string(), "session=abc".to_string()),
            ("X-Client".to_string(), "tether".to_string()),
        ];
        let request = build_request("ws://localhost:8000/ws/control", &headers).unwrap();
        assert_eq!(request.uri().path(), "/ws/control");
        assert_eq!(request.headers()["cookie"], "session=abc");
        assert_eq!(request.headers()["x-client"], "tether");
    }

    #[test]
    fn test_build_request_rejects_bad_header() {
        let headers = vec![("bad name".to_string(), "x".to_string())];
        assert!(matches!(
            build_request("ws://localhost/chan", &headers),
            Err(ChannelError::InvalidHeader(_))
        ));

        let headers = vec![("X-Ok".to_string(), "line\nbreak".to_string())];
        assert!(matches!(
            build_request("ws://localhost/chan", &headers),
            Err(ChannelError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_handle_close_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = TungsteniteHandle {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };

        handle.send_text("{}".into()).unwrap();
        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(handle.send_text("{}".into()), Err(ChannelError::NotConnected));

        assert!(matches!(rx.try_recv(), Ok(Outbound::Text(_))));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        assert!(rx.try_recv().is_err());
    }
}
