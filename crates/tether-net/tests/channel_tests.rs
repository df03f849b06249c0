//! Tests for the channel client against a local WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tether_net::{
    ChannelClient, ChannelError, ClientOptions, ConnectionState, Generation, InboundMessage,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the test server treats each connection.
#[derive(Clone, Default)]
struct Behavior {
    /// Frames pushed to every connection right after the handshake.
    greeting: Vec<String>,
    /// Close the first connection with code 1001 after the greeting.
    close_first: bool,
}

/// What the test server observed.
#[derive(Clone, Default)]
struct ServerLog {
    accepted: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<String>>>,
    cookies: Arc<Mutex<Vec<String>>>,
    close_replies: Arc<AtomicUsize>,
}

impl ServerLog {
    fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Start a WebSocket server on an ephemeral port. Text frames are recorded;
/// `{"type":"ping"}` is answered with `{"type":"Pong"}`.
async fn spawn_server(behavior: Behavior) -> (u16, ServerLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = ServerLog::default();
    let server_log = log.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = server_log.clone();
            let behavior = behavior.clone();
            tokio::spawn(async move {
                let cookies = log.cookies.clone();
                let callback = move |request: &Request,
                                     response: Response|
                      -> Result<Response, ErrorResponse> {
                    if let Some(cookie) = request.headers().get("cookie")
                        && let Ok(cookie) = cookie.to_str()
                    {
                        cookies.lock().push(cookie.to_string());
                    }
                    Ok(response)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                let index = log.accepted.fetch_add(1, Ordering::SeqCst) + 1;
                let (mut write, mut read) = ws.split();

                for frame in &behavior.greeting {
                    if write.send(Message::Text(frame.clone().into())).await.is_err() {
                        return;
                    }
                }

                if behavior.close_first && index == 1 {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "restarting".to_string().into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    // Count the client's half of the close handshake.
                    while let Some(Ok(message)) = read.next().await {
                        if let Message::Close(_) = message {
                            log.close_replies.fetch_add(1, Ordering::SeqCst);
                            break;
                        }
                    }
                    return;
                }

                while let Some(Ok(message)) = read.next().await {
                    if let Message::Text(text) = message {
                        let text = text.to_string();
                        log.frames.lock().push(text.clone());
                        if text == r#"{"type":"ping"}"# {
                            let pong = r#"{"type":"Pong"}"#.to_string();
                            let _ = write.send(Message::Text(pong.into())).await;
                        }
                    }
                }
            });
        }
    });

    (port, log)
}

/// A port with nothing listening on it.
fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

fn local(port: u16) -> ClientOptions {
    ClientOptions::new()
        .host("127.0.0.1")
        .port(port)
        .reconnect_interval(Duration::from_millis(20))
}

#[test]
fn test_init_requires_runtime() {
    let client = ChannelClient::new();
    assert_eq!(
        client.init("/chan", ClientOptions::new()),
        Err(ChannelError::NoRuntime)
    );
    assert_eq!(client.url(), None);
}

#[test]
fn test_client_initial_state() {
    let client = ChannelClient::new();
    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(!client.is_connected());
    assert_eq!(client.generation(), None);
    assert_eq!(client.send("user", &()), Err(ChannelError::NotInitialized));
}

#[test]
fn test_register_and_unregister() {
    let client = ChannelClient::new();
    let first = client.register("User", |_: &InboundMessage| {});
    let second = client.register("user", |_: &InboundMessage| {});
    assert_ne!(first, second);
    assert_eq!(client.registry().read().len(), 2);

    assert!(client.unregister(first));
    assert!(!client.unregister(first));
    assert_eq!(client.registry().read().handlers_for("USER").len(), 1);
}

#[tokio::test]
async fn test_init_validation() {
    init_tracing();
    let port = unused_port();

    let client = ChannelClient::new();
    assert!(matches!(
        client.init("chan", local(port)),
        Err(ChannelError::InvalidUrl(_))
    ));
    assert!(matches!(
        client.init("/chan", local(port).header("bad name", "x")),
        Err(ChannelError::InvalidHeader(_))
    ));
    assert_eq!(client.url(), None);

    client.init("/chan", local(port).auto_reconnect(false)).unwrap();
    assert_eq!(client.url(), Some(format!("ws://127.0.0.1:{port}/chan")));
    assert_eq!(
        client.init("/chan", local(port)),
        Err(ChannelError::AlreadyInitialized)
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_connects_and_fires_open_once() {
    init_tracing();
    let (port, server) = spawn_server(Behavior::default()).await;
    let (opens, opens_hook) = counter();

    let client = ChannelClient::new();
    client
        .init(
            "/ws/control",
            local(port).on_open(move |event| {
                assert_eq!(event.generation, Generation::new(1));
                opens_hook.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    assert!(wait_until(|| client.is_connected()).await);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(client.generation(), Some(Generation::new(1)));

    // The reconnect poll keeps ticking but the slot is occupied.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_and_pong_consumed() {
    init_tracing();
    let (port, server) = spawn_server(Behavior::default()).await;
    let (pongs, pong_handler) = counter();
    let (messages, message_hook) = counter();

    let client = ChannelClient::new();
    client.register("pong", move |_: &InboundMessage| {
        pong_handler.fetch_add(1, Ordering::SeqCst);
    });
    client
        .init(
            "/ws/control",
            local(port)
                .heartbeat_interval(Duration::from_millis(50))
                .on_message(move |_| {
                    message_hook.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();

    assert!(wait_until(|| server.frames().iter().any(|f| f == r#"{"type":"ping"}"#)).await);
    assert!(wait_until(|| messages.load(Ordering::SeqCst) > 0).await);
    assert_eq!(pongs.load(Ordering::SeqCst), 0);
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn test_server_push_reaches_handlers_in_order() {
    init_tracing();
    let behavior = Behavior {
        greeting: vec![r#"{"type":"MenuItems","data":[{"label":"Home"}]}"#.to_string()],
        ..Behavior::default()
    };
    let (port, _server) = spawn_server(behavior).await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let client = ChannelClient::new();
    for tag in ["first", "second"] {
        let seen = seen.clone();
        client.register("menuitems", move |msg: &InboundMessage| {
            seen.lock().push((tag, msg.data[0]["label"].clone()));
        });
    }
    client.init("/ws/control", local(port)).unwrap();

    assert!(wait_until(|| seen.lock().len() == 2).await);
    assert_eq!(
        *seen.lock(),
        vec![("first", json!("Home")), ("second", json!("Home"))]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_send_reaches_server_with_headers() {
    init_tracing();
    let (port, server) = spawn_server(Behavior::default()).await;

    let client = ChannelClient::new();
    client
        .init("/ws/control", local(port).header("Cookie", "session=abc"))
        .unwrap();
    assert!(wait_until(|| client.is_connected()).await);

    client.send("Login", &json!({ "user": "jam" })).unwrap();
    client.send("Logout", &()).unwrap();

    assert!(wait_until(|| server.frames().len() == 2).await);
    assert_eq!(
        server.frames(),
        vec![
            r#"{"type":"Login","data":{"user":"jam"}}"#.to_string(),
            r#"{"type":"Logout"}"#.to_string(),
        ]
    );
    assert_eq!(*server.cookies.lock(), vec!["session=abc".to_string()]);

    client.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    init_tracing();
    let behavior = Behavior {
        close_first: true,
        ..Behavior::default()
    };
    let (port, server) = spawn_server(behavior).await;
    let (opens, opens_hook) = counter();
    let closes = Arc::new(Mutex::new(Vec::new()));
    let closes_hook = closes.clone();

    let client = ChannelClient::new();
    client
        .init(
            "/ws/control",
            local(port)
                .on_open(move |_| {
                    opens_hook.fetch_add(1, Ordering::SeqCst);
                })
                .on_close(move |event| closes_hook.lock().push(event.clone())),
        )
        .unwrap();

    assert!(
        wait_until(|| client.generation() == Some(Generation::new(2)) && client.is_connected())
            .await
    );
    assert_eq!(server.accepted(), 2);
    assert_eq!(opens.load(Ordering::SeqCst), 2);

    let closes = closes.lock().clone();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].generation, Generation::new(1));
    assert_eq!(closes[0].code, Some(1001));
    assert_eq!(closes[0].reason.as_deref(), Some("restarting"));
    assert!(wait_until(|| server.close_replies.load(Ordering::SeqCst) == 1).await);

    client.shutdown().await;
}

#[tokio::test]
async fn test_send_while_disconnected_reports_error() {
    init_tracing();
    let port = unused_port();
    let (errors, errors_hook) = counter();

    let client = ChannelClient::new();
    client
        .init(
            "/ws/control",
            local(port).auto_reconnect(false).on_error(move |event| {
                assert!(event.error.is_transport());
                errors_hook.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    // The first attempt is refused.
    assert!(wait_until(|| errors.load(Ordering::SeqCst) >= 1).await);
    assert!(wait_until(|| client.state() == ConnectionState::Idle).await);
    let before = errors.load(Ordering::SeqCst);

    assert_eq!(client.send("user", &json!({ "id": 1 })), Ok(()));
    assert!(wait_until(|| errors.load(Ordering::SeqCst) > before).await);

    client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_traffic() {
    init_tracing();
    let (port, server) = spawn_server(Behavior::default()).await;

    let client = ChannelClient::new();
    client
        .init(
            "/ws/control",
            local(port).heartbeat_interval(Duration::from_millis(30)),
        )
        .unwrap();
    assert!(wait_until(|| !server.frames().is_empty()).await);

    client.shutdown().await;
    assert!(client.is_shut_down());
    assert_eq!(client.state(), ConnectionState::Idle);
    assert_eq!(client.generation(), None);
    assert_eq!(client.send("user", &()), Err(ChannelError::ShutDown));
    assert_eq!(
        client.init("/ws/control", local(port)),
        Err(ChannelError::ShutDown)
    );

    // Give any stray timer a chance to fire.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frames = server.frames().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.frames().len(), frames);
    assert_eq!(server.accepted(), 1);

    // Idempotent
    client.shutdown().await;
}

#[tokio::test]
async fn test_panicking_handler_keeps_channel_alive() {
    init_tracing();
    let behavior = Behavior {
        greeting: vec![r#"{"type":"boom"}"#.to_string()],
        close_first: true,
    };
    let (port, server) = spawn_server(behavior).await;
    let (booms, boom_handler) = counter();

    let client = ChannelClient::new();
    client.register("boom", move |_: &InboundMessage| {
        boom_handler.fetch_add(1, Ordering::SeqCst);
        panic!("handler failed");
    });
    client.init("/ws/control", local(port)).unwrap();

    assert!(
        wait_until(|| client.generation() == Some(Generation::new(2)) && client.is_connected())
            .await
    );
    assert_eq!(server.accepted(), 2);
    assert!(wait_until(|| booms.load(Ordering::SeqCst) == 2).await);

    assert_eq!(client.send("user", &json!({ "id": 7 })), Ok(()));
    assert!(wait_until(|| server.frames().contains(&r#"{"type":"user","data":{"id":7}}"#.to_string())).await);

    client.shutdown().await;
}
