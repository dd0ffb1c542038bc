//! Per-connection handler.
//!
//! A connection goes Connecting -> Active -> Closed. The upgrade is refused
//! unless the request targets [`WS_PATH`] with a non-empty `session` query
//! parameter, so rejected clients never touch the registry. Once active, the
//! handler owns exactly one registry entry and removes it when its read loop
//! ends.

use crate::registry::{ConnectionHandle, Player, PlayerRegistry};
use futures_util::{SinkExt, Stream, StreamExt};
use protocol::ClientPacket;
use protocol::packets::build_echo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

/// Path the WebSocket endpoint is served on.
pub const WS_PATH: &str = "/ws";

/// Query parameter carrying the session id.
pub const SESSION_PARAM: &str = "session";

/// Why a connection left the Active state.
#[derive(Debug)]
enum CloseReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Read failed.
    ReadError(WsError),
    /// The echo reply could not be queued.
    WriteFailed,
}

/// Drive one TCP connection through handshake, message loop and cleanup.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<PlayerRegistry>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    // Connecting
    let mut session = None;
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        let id = session_from_request(req)?;
        session = Some(id);
        Ok(resp)
    })
    .await?;
    let Some(session_id) = session else {
        anyhow::bail!("handshake completed without a session id");
    };
    info!("New connection from {} as {}", addr, session_id);

    let (mut write, read) = ws_stream.split();
    let (handle, mut outbound) = ConnectionHandle::channel();

    // Writer task: sole owner of the sink. Ends when every handle is gone or
    // a write fails.
    let writer_id = session_id.clone();
    tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = write.send(msg).await {
                debug!("Write to {} failed: {}", writer_id, e);
                break;
            }
        }
    });

    run_session(&session_id, &registry, handle, read, shutdown).await;
    Ok(())
}

/// Active and Closed phases: register the player, apply inbound messages
/// until the stream ends or a reply cannot be queued, then remove the entry.
async fn run_session<S>(
    session_id: &str,
    registry: &PlayerRegistry,
    handle: ConnectionHandle,
    mut inbound: S,
    mut shutdown: watch::Receiver<bool>,
) -> CloseReason
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    registry.add(Player::new(session_id, handle.clone())).await;

    let mut closing = false;
    let reason = loop {
        tokio::select! {
            msg = inbound.next() => {
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                    Some(Ok(Message::Close(_))) | None => break CloseReason::PeerClosed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break CloseReason::ReadError(e),
                };

                match ClientPacket::parse(&payload) {
                    ClientPacket::Update(update) => {
                        registry.update_state(session_id, &update).await;
                        let pos = update.position;
                        debug!(
                            "Updated player {} - Pos: ({:.2}, {:.2}, {:.2}), Anim: {:?}",
                            session_id, pos.x, pos.y, pos.z, update.animation
                        );
                    }
                    ClientPacket::Text(text) => {
                        info!("Received from {}: {}", session_id, text);
                        if handle.send_text(build_echo(session_id, &text)).is_err() {
                            break CloseReason::WriteFailed;
                        }
                    }
                }
            }
            _ = shutdown.changed(), if !closing => {
                // Ask the peer to close and keep reading until it acknowledges.
                closing = true;
                if handle.close().is_err() {
                    break CloseReason::WriteFailed;
                }
            }
        }
    };

    match &reason {
        CloseReason::PeerClosed => info!("Player {} disconnected", session_id),
        CloseReason::ReadError(e) => info!("Player {} disconnected: {}", session_id, e),
        CloseReason::WriteFailed => warn!("Player {} dropped: write error", session_id),
    }
    registry.remove(session_id).await;

    reason
}

/// Validate the upgrade request and pull out the session id.
fn session_from_request(req: &Request) -> Result<String, ErrorResponse> {
    if req.uri().path() != WS_PATH {
        return Err(reject(StatusCode::NOT_FOUND, "not found"));
    }

    req.uri()
        .query()
        .and_then(|query| query_param(query, SESSION_PARAM))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "missing session parameter"))
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// First value of `name` in a URL query string, percent-decoded.
///
/// Pairs with a malformed escape are skipped.
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if percent_decode(key)? != name {
            return None;
        }
        percent_decode(value)
    })
}

/// Decode `%XX` escapes and `+` as space. `None` on a malformed escape.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = hex_value(*bytes.get(i + 1)?)?;
                let lo = hex_value(*bytes.get(i + 2)?)?;
                out.push(hi << 4 | lo);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
