// The realtime connection: token handshake, then one read task (this
// handler) and one spawned write task per socket. The read pump decodes
// frames and hands messages to the inbound router; the write pump serves the
// broadcast stream, the direct reply queue, and the ping heartbeat.

use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use super::AppState;
use crate::messages::decode_frame;
use crate::metrics;
use crate::router;
use crate::session::Session;

/// How long to wait for any inbound traffic (pongs included) before the
/// connection is considered dead.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence; must fire well inside PONG_WAIT.
const PING_PERIOD: Duration = Duration::from_secs(54);
/// Deadline for a single outbound write.
const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Inbound frame size cap, enforced by the websocket layer.
const MAX_MESSAGE_SIZE: usize = 4096;
/// Direct (per-connection) reply queue depth.
const DIRECT_QUEUE_CAPACITY: usize = 64;

#[derive(Deserialize)]
pub struct GameQuery {
    token: Option<String>,
}

/// Websocket upgrade for `/game?token=<hex>`.
pub async fn ws_game(
    ws: WebSocketUpgrade,
    Query(query): Query<GameQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_ws(socket, state, token))
}

async fn handle_ws(mut socket: WebSocket, state: AppState, token: String) {
    // Handshake: resolve the session token before touching any state.
    let session = match state.sessions.lookup(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            close_policy_violation(&mut socket, "invalid session token").await;
            return;
        }
        Err(e) => {
            tracing::warn!("session lookup failed: {e}");
            close_policy_violation(&mut socket, "session unavailable").await;
            return;
        }
    };
    let player_id = session.user_id.clone();
    tracing::info!(player_id = %player_id, name = %session.name, "client connected");

    // Register: clients set, lobby presence, lobby broadcast.
    state.hub.register(&player_id);
    if let Err(e) = state.presence.add_to_lobby(&player_id, &session.name).await {
        tracing::warn!(player_id = %player_id, "presence add_to_lobby failed: {e}");
    }
    router::broadcast_lobby_state(&state.presence, &state.hub).await;

    let (sender, receiver) = socket.split();
    let (direct_tx, direct_rx) = mpsc::channel::<Vec<u8>>(DIRECT_QUEUE_CAPACITY);
    let broadcast_rx = state.hub.subscribe();
    let write_task = tokio::spawn(write_pump(sender, broadcast_rx, direct_rx));

    read_pump(receiver, &state, &session, &token, &direct_tx).await;

    // Shutdown drain: any read error or close lands here.
    {
        let mut world = state.world.lock().unwrap();
        world.remove_player(&player_id);
        metrics::WORLD_PLAYERS.set(world.players().count() as i64);
    }
    state.hub.unregister(&player_id);
    if let Err(e) = state.presence.remove(&player_id).await {
        tracing::warn!(player_id = %player_id, "presence remove failed: {e}");
    }
    drop(direct_tx);
    write_task.abort();
    router::broadcast_lobby_state(&state.presence, &state.hub).await;
    tracing::info!(player_id = %player_id, "client disconnected");
}

async fn close_policy_violation(socket: &mut WebSocket, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from_static(reason),
        })))
        .await;
}

/// Read framed binary messages with a rolling deadline. Malformed frames are
/// dropped without killing the connection; pongs refresh the session TTL.
async fn read_pump(
    mut receiver: SplitStream<WebSocket>,
    state: &AppState,
    session: &Session,
    token: &str,
    direct_tx: &mpsc::Sender<Vec<u8>>,
) {
    loop {
        let next = tokio::time::timeout(PONG_WAIT, receiver.next()).await;
        match next {
            Err(_) => {
                tracing::warn!(player_id = %session.user_id, "read deadline exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(player_id = %session.user_id, "socket read error: {e}");
                return;
            }
            Ok(Some(Ok(Message::Binary(bytes)))) => match decode_frame(&bytes) {
                Ok(messages) => {
                    for message in messages {
                        router::dispatch(state, session, direct_tx, message).await;
                    }
                }
                Err(e) => {
                    metrics::MALFORMED_FRAMES_TOTAL.inc();
                    tracing::warn!(player_id = %session.user_id, "malformed frame: {e}");
                }
            },
            Ok(Some(Ok(Message::Pong(_)))) => {
                // Heartbeat: extend the session off the hot path.
                let sessions = state.sessions.clone();
                let token = token.to_string();
                tokio::spawn(async move {
                    if let Err(e) = sessions.refresh(&token).await {
                        tracing::debug!("session refresh failed: {e}");
                    }
                });
            }
            Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(_))) => {
                // Text frames are not part of the protocol; pings are
                // answered by the websocket layer.
            }
        }
    }
}

/// Serve the outbound side: coalesce queued direct replies into single
/// frames, relay broadcast frames, and ping on a timer. Every write runs
/// under WRITE_WAIT.
async fn write_pump(
    mut sender: SplitSink<WebSocket, Message>,
    mut broadcast_rx: broadcast::Receiver<Vec<u8>>,
    mut direct_rx: mpsc::Receiver<Vec<u8>>,
) {
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            queued = direct_rx.recv() => {
                let mut frame = match queued {
                    Some(frame) => frame,
                    None => return,
                };
                // Records are length-delimited, so frames concatenate.
                while let Ok(next) = direct_rx.try_recv() {
                    frame.extend_from_slice(&next);
                }
                if !send_frame(&mut sender, frame).await {
                    return;
                }
            }
            result = broadcast_rx.recv() => {
                match result {
                    Ok(frame) => {
                        if !send_frame(&mut sender, frame).await {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        metrics::BROADCAST_LAGGED_TOTAL.inc_by(n);
                        tracing::warn!("client lagged, skipped {n} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: Vec<u8>) -> bool {
    match tokio::time::timeout(WRITE_WAIT, sender.send(Message::Binary(frame.into()))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!("socket write error: {e}");
            false
        }
        Err(_) => {
            tracing::warn!("write deadline exceeded, closing connection");
            false
        }
    }
}
