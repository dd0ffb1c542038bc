//! End-to-end tests against a real listener and WebSocket clients.

use futures_util::{SinkExt, StreamExt};
use protocol::{AnimationState, ClientUpdate, Vec3, WorldSnapshot};
use server::{Config, PlayerRegistry, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    registry: Arc<PlayerRegistry>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), server::ServerError>>,
}

async fn start() -> TestServer {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.tick_rate = 50;

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(async {
        let _ = stopped.await;
    }));

    TestServer {
        addr,
        registry,
        stop,
        task,
    }
}

async fn connect(addr: SocketAddr, session: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?session={session}"))
        .await
        .unwrap();
    ws
}

async fn wait_for_count(registry: &PlayerRegistry, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while registry.count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("player count never reached expected value");
}

/// Read text frames until `pred` accepts one.
async fn next_text_matching<F>(ws: &mut Client, mut pred: F) -> String
where
    F: FnMut(&str) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) if pred(text.as_str()) => {
                    return text.as_str().to_owned();
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended early: {other:?}"),
            }
        }
    })
    .await
    .expect("no matching message")
}

#[tokio::test]
async fn handshake_without_session_is_rejected() {
    let server = start().await;

    for path in ["/ws", "/ws?session="] {
        match connect_async(format!("ws://{}{}", server.addr, path)).await {
            Err(WsError::Http(response)) => {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path: {path}")
            }
            Err(e) => panic!("expected HTTP rejection for {path}, got {e}"),
            Ok(_) => panic!("handshake for {path} was accepted"),
        }
    }
    assert_eq!(server.registry.count().await, 0);

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn update_shows_up_in_broadcast() {
    let server = start().await;
    let mut ws = connect(server.addr, "p1").await;
    wait_for_count(&server.registry, 1).await;

    let update = ClientUpdate {
        position: Vec3::new(5.0, 5.0, 0.0),
        rotation: Vec3::ZERO,
        animation: AnimationState::Walking,
    };
    ws.send(Message::Text(serde_json::to_string(&update).unwrap().into()))
        .await
        .unwrap();

    let mut last_tick = 0;
    let text = next_text_matching(&mut ws, |text| {
        let Ok(world) = WorldSnapshot::from_json(text) else {
            return false;
        };
        // Ticks seen by one consumer are strictly increasing.
        assert!(world.tick > last_tick, "tick {} after {}", world.tick, last_tick);
        last_tick = world.tick;
        world
            .players
            .iter()
            .any(|p| p.id == "p1" && p.position == Vec3::new(5.0, 5.0, 0.0))
    })
    .await;

    let world = WorldSnapshot::from_json(&text).unwrap();
    assert_eq!(world.players.len(), 1);
    assert_eq!(world.players[0].name, "Player-p1");
    assert_eq!(world.players[0].animation, AnimationState::Walking);

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn plain_text_is_echoed() {
    let server = start().await;
    let mut ws = connect(server.addr, "p1").await;

    ws.send(Message::Text("hello world".into())).await.unwrap();
    let echo = next_text_matching(&mut ws, |text| text.starts_with("Echo from")).await;
    assert_eq!(echo, "Echo from p1: hello world");

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn disconnect_removes_player_from_snapshots() {
    let server = start().await;
    let mut stayer = connect(server.addr, "stayer").await;
    let mut leaver = connect(server.addr, "leaver").await;
    wait_for_count(&server.registry, 2).await;

    leaver.close(None).await.unwrap();
    wait_for_count(&server.registry, 1).await;

    next_text_matching(&mut stayer, |text| {
        WorldSnapshot::from_json(text)
            .map(|world| world.players.len() == 1 && world.players[0].id == "stayer")
            .unwrap_or(false)
    })
    .await;

    let _ = server.stop.send(());
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let server = start().await;
    let mut ws = connect(server.addr, "p1").await;
    wait_for_count(&server.registry, 1).await;

    let _ = server.stop.send(());

    // Keep reading past the close frame so the client's reply gets flushed.
    let mut saw_close = false;
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => saw_close = true,
                Some(Ok(_)) => continue,
                None | Some(Err(_)) => break,
            }
        }
    })
    .await
    .expect("connection was not closed");
    assert!(saw_close);

    server.task.await.unwrap().unwrap();
    assert_eq!(server.registry.count().await, 0);
}
