//! Integration tests for the connection lifecycle.
//!
//! These drive a real `RealtimeClient` against an in-process WebSocket
//! stub server: the stub accepts connections, answers CONNECT with
//! CONNECTED, records every decoded frame, and lets tests push frames or
//! drop the socket to force the reconnect policy.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use stormlink::frame::{self, Frame, FrameCommand};
use stormlink::{
    ConnectionState, LocationSample, RealtimeClient, ReportDraft, SafetyStatus, StaticProfile,
    TransportError,
};

/// One accepted and WebSocket-handshaken connection on the stub server.
///
/// Dropping the handle closes the socket, which is how tests force an
/// unexpected disconnect.
struct ServerConn {
    frames: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<String>,
    _drop_guard: oneshot::Sender<()>,
}

impl ServerConn {
    /// Next decoded frame from the client, bounded by a timeout.
    async fn recv_frame(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("frame within timeout")
            .expect("connection still open")
    }

    /// Whether any frame arrives within the window.
    async fn recv_frame_within(&mut self, window: Duration) -> Option<Frame> {
        tokio::time::timeout(window, self.frames.recv()).await.ok()?
    }

    /// Push one frame to the client.
    fn send_frame(&self, frame: &Frame) {
        let wire = frame::encode(frame).expect("encodable frame");
        self.outgoing.send(wire).expect("connection still open");
    }
}

/// Scripted stub server: handshakes every connection and auto-replies
/// CONNECTED to CONNECT frames.
struct StubServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConn>,
}

impl StubServer {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("local addr");
        let (conn_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let (mut sink, mut stream) = ws.split();
                    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
                    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
                    let (drop_tx, mut drop_rx) = oneshot::channel::<()>();

                    if conn_tx
                        .send(ServerConn {
                            frames: frame_rx,
                            outgoing: out_tx,
                            _drop_guard: drop_tx,
                        })
                        .is_err()
                    {
                        return;
                    }

                    loop {
                        tokio::select! {
                            msg = stream.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let Ok(decoded) = frame::decode(&text) else {
                                        continue;
                                    };
                                    if decoded.command == FrameCommand::Connect {
                                        let connected =
                                            frame::encode(&Frame::new(FrameCommand::Connected))
                                                .expect("encodable");
                                        if sink.send(Message::Text(connected)).await.is_err() {
                                            break;
                                        }
                                    }
                                    if frame_tx.send(decoded).is_err() {
                                        break;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            out = out_rx.recv() => match out {
                                Some(text) => {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                None => break,
                            },
                            // Completes when the test drops its ServerConn.
                            _ = &mut drop_rx => break,
                        }
                    }
                });
            }
        });

        Self { addr, connections }
    }

    fn endpoint(&self) -> String {
        format!("ws://{}/rt", self.addr)
    }

    /// Next handshaken connection, bounded by a timeout.
    async fn next_conn(&mut self) -> ServerConn {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("connection within timeout")
            .expect("listener alive")
    }
}

/// Dead listener: accepts TCP and immediately drops, counting attempts.
/// Every WebSocket handshake against it fails.
async fn spawn_dead_listener() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind dead stub");
    let addr = listener.local_addr().expect("local addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (addr, accepted)
}

fn test_client(endpoint: &str) -> RealtimeClient {
    RealtimeClient::builder()
        .endpoint(endpoint)
        .profile(Arc::new(
            StaticProfile::new("Lan", "+84901234567").with_status(SafetyStatus::Safe),
        ))
        .auto_telemetry(false)
        .reconnect_base_delay(Duration::from_millis(25))
        .handshake_timeout(Duration::from_secs(2))
        .build()
}

async fn wait_for_state(client: &RealtimeClient, want: ConnectionState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while client.state() != want {
        assert!(
            tokio::time::Instant::now() < deadline,
            "state never reached {want}, stuck at {}",
            client.state()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_connect_handshake_carries_version_and_identity() {
    let mut server = StubServer::spawn().await;
    let client = test_client(&server.endpoint());

    client.connect("user-7").await.expect("handshake succeeds");
    assert_eq!(client.state(), ConnectionState::Connected);

    let mut conn = server.next_conn().await;
    let connect = conn.recv_frame().await;
    assert_eq!(connect.command, FrameCommand::Connect);
    assert_eq!(connect.header("version"), Some("1.0"));
    assert_eq!(connect.header("identity"), Some("user-7"));

    // Connecting again with the same identity is a no-op success.
    client.connect("user-7").await.expect("no-op reconnect");
    assert!(
        conn.recv_frame_within(Duration::from_millis(150)).await.is_none(),
        "no second handshake for a same-identity connect"
    );
}

#[tokio::test]
async fn test_subscriptions_queued_while_idle_replay_on_connect() {
    let mut server = StubServer::spawn().await;
    let client = test_client(&server.endpoint());

    assert!(client.subscribe("/topic/community"));
    assert!(client.subscribe("/user/queue/alerts"));

    client.connect("user-1").await.expect("handshake succeeds");

    let mut conn = server.next_conn().await;
    assert_eq!(conn.recv_frame().await.command, FrameCommand::Connect);

    let first = conn.recv_frame().await;
    assert_eq!(first.command, FrameCommand::Subscribe);
    assert_eq!(first.header("destination"), Some("/topic/community"));

    let second = conn.recv_frame().await;
    assert_eq!(second.command, FrameCommand::Subscribe);
    assert_eq!(second.header("destination"), Some("/user/queue/alerts"));
}

#[tokio::test]
async fn test_reconnect_replays_subscriptions_once_in_order() {
    let mut server = StubServer::spawn().await;
    let client = test_client(&server.endpoint());

    client.connect("user-1").await.expect("handshake succeeds");
    client.subscribe("/topic/community");
    client.subscribe("/topic/weather");

    let conn1 = server.next_conn().await;
    // Force two unexpected closes inside the retry budget.
    drop(conn1);
    let conn2 = server.next_conn().await;
    drop(conn2);

    // Third connection survives; the registry must be replayed exactly
    // once, in insertion order.
    let mut conn3 = server.next_conn().await;
    assert_eq!(conn3.recv_frame().await.command, FrameCommand::Connect);
    let first = conn3.recv_frame().await;
    assert_eq!(first.command, FrameCommand::Subscribe);
    assert_eq!(first.header("destination"), Some("/topic/community"));
    let second = conn3.recv_frame().await;
    assert_eq!(second.command, FrameCommand::Subscribe);
    assert_eq!(second.header("destination"), Some("/topic/weather"));

    assert!(
        conn3.recv_frame_within(Duration::from_millis(200)).await.is_none(),
        "no duplicate replays"
    );

    wait_for_state(&client, ConnectionState::Connected).await;
    assert_eq!(
        client.subscriptions(),
        vec!["/topic/community", "/topic/weather"]
    );
}

#[tokio::test]
async fn test_send_report_reaches_server_with_profile_merged() {
    let mut server = StubServer::spawn().await;
    let client = test_client(&server.endpoint());

    client.connect("user-1").await.expect("handshake succeeds");
    let mut conn = server.next_conn().await;
    assert_eq!(conn.recv_frame().await.command, FrameCommand::Connect);

    let draft = ReportDraft {
        kind: "FLOOD".to_string(),
        detail: "street_flooding".to_string(),
        description: "Water rising fast near the market".to_string(),
        image: None,
        lat: 10.77,
        lon: 106.7,
        captured_at_ms: 1_700_000_000_000,
    };
    client.send_report(&draft).expect("queued while connected");

    let sent = conn.recv_frame().await;
    assert_eq!(sent.command, FrameCommand::Send);
    assert_eq!(sent.header("type"), Some("report"));
    assert_eq!(sent.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_str(&sent.body).expect("json body");
    assert_eq!(body["type"], "FLOOD");
    assert_eq!(body["user_name"], "Lan");
    assert_eq!(body["phone_number"], "+84901234567");
}

#[tokio::test]
async fn test_close_returns_to_idle_and_rejects_sends() {
    let mut server = StubServer::spawn().await;
    let client = test_client(&server.endpoint());

    client.connect("user-1").await.expect("handshake succeeds");
    let _conn = server.next_conn().await;

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Idle);

    let sample = LocationSample {
        lat: 10.0,
        lon: 106.0,
        accuracy_m: 4.0,
        status: SafetyStatus::Safe,
        captured_at_ms: 0,
    };
    let err = client.send_location(&sample).expect_err("closed client");
    assert!(matches!(err, TransportError::NotConnected));

    // Subscriptions survive an explicit close.
    client.subscribe("/topic/community");
    client.close().await;
    assert_eq!(client.subscriptions(), vec!["/topic/community"]);
}

#[tokio::test]
async fn test_server_error_frame_forces_reconnect() {
    let mut server = StubServer::spawn().await;
    let client = test_client(&server.endpoint());

    client.connect("user-1").await.expect("handshake succeeds");
    let mut conn1 = server.next_conn().await;
    assert_eq!(conn1.recv_frame().await.command, FrameCommand::Connect);

    // A server ERROR is fatal for this socket and engages the retry policy.
    conn1.send_frame(
        &Frame::new(FrameCommand::Error).with_header("message", "subscription quota exceeded"),
    );

    let mut conn2 = server.next_conn().await;
    assert_eq!(conn2.recv_frame().await.command, FrameCommand::Connect);
    wait_for_state(&client, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_retry_ceiling_stops_automatic_reconnects() {
    let (addr, accepted) = spawn_dead_listener().await;
    let client = RealtimeClient::builder()
        .endpoint(format!("ws://{addr}/rt"))
        .profile(Arc::new(StaticProfile::new("T", "+1")))
        .auto_telemetry(false)
        .reconnect_base_delay(Duration::from_millis(20))
        .handshake_timeout(Duration::from_millis(500))
        .build();

    let err = client.connect("user-1").await.expect_err("handshake fails");
    assert!(matches!(
        err,
        TransportError::ConnectionFailed(_) | TransportError::HandshakeTimeout
    ));

    // Linear backoff: 20+40+60+80+100ms of delays plus handshake overhead.
    // Wait long enough for the whole budget to play out.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        accepted.load(Ordering::SeqCst),
        6,
        "initial attempt plus exactly five retries"
    );
    assert_eq!(client.state(), ConnectionState::Closed);

    // No sixth retry gets scheduled.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 6);

    // A fresh connect resets the attempt counter and tries again.
    let _ = client.connect("user-1").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(accepted.load(Ordering::SeqCst) >= 7);
}
