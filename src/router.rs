// Inbound router: takes decoded client messages and dispatches them to the
// simulator, the presence store, and the pubsub bus. World mutations happen
// under the world lock and the lock is never held across an await.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::api::AppState;
use crate::hub::Hub;
use crate::messages::{
    encode_message, Announcement, GameMessage, PlayerEvent, PlayerEventKind, Vec2,
};
use crate::metrics;
use crate::presence::PresenceStore;
use crate::pubsub::{CHANNEL_CHAT_GAME, CHANNEL_CHAT_LOBBY};
use crate::session::Session;

/// Recompute the full lobby state and broadcast it to local clients. Every
/// presence mutation funnels through this.
pub async fn broadcast_lobby_state(presence: &PresenceStore, hub: &Hub) {
    match presence.lobby_state().await {
        Ok(state) => hub.broadcast_message(&GameMessage::LobbyState(state)),
        Err(e) => tracing::warn!("failed to read lobby state: {e}"),
    }
}

/// Dispatch one decoded message from a connection.
pub async fn dispatch(
    state: &AppState,
    session: &Session,
    direct: &mpsc::Sender<Vec<u8>>,
    message: GameMessage,
) {
    metrics::MESSAGES_RECEIVED_TOTAL.inc();
    match message {
        GameMessage::Chat(mut chat) => {
            // The sender identity always comes from the session, never from
            // the client payload.
            chat.sender_id = session.user_id.clone();
            chat.sender_name = session.name.clone();
            chat.sent_at = chrono::Utc::now().timestamp();

            let in_game = {
                let world = state.world.lock().unwrap();
                world.player(&session.user_id).is_some()
            };
            let channel = if in_game {
                CHANNEL_CHAT_GAME
            } else {
                CHANNEL_CHAT_LOBBY
            };
            match encode_message(&GameMessage::Chat(chat)) {
                Ok(frame) => {
                    if let Err(e) = state.bus.publish(channel, &frame).await {
                        tracing::warn!(channel, "chat publish failed: {e}");
                    }
                }
                Err(e) => tracing::warn!("failed to encode chat message: {e}"),
            }
        }
        GameMessage::PlayerEvent(event) => {
            handle_player_event(state, session, direct, event).await;
        }
        GameMessage::GameState(_) | GameMessage::LobbyState(_) | GameMessage::Announcement(_) => {
            tracing::warn!(
                player_id = %session.user_id,
                "dropping server-only message type from client"
            );
        }
    }
}

async fn handle_player_event(
    state: &AppState,
    session: &Session,
    direct: &mpsc::Sender<Vec<u8>>,
    event: PlayerEvent,
) {
    // The event always acts on the connection's own player.
    let player_id = session.user_id.clone();

    match event.kind {
        PlayerEventKind::Join => {
            let name = match state.presence.name(&player_id).await {
                Ok(Some(name)) => name,
                _ => session.name.clone(),
            };

            let (sx, sy) = {
                let mut world = state.world.lock().unwrap();
                let spawn = world.add_player(&player_id, &name);
                metrics::WORLD_PLAYERS.set(world.players().count() as i64);
                spawn
            };

            if let Err(e) = state.presence.move_to_game(&player_id).await {
                tracing::warn!(%player_id, "presence move_to_game failed: {e}");
            }

            // Answer with the server-assigned spawn.
            let mut reply = PlayerEvent::bare(PlayerEventKind::Join, &player_id);
            reply.position = Some(Vec2 { x: sx, y: sy });
            match encode_message(&GameMessage::PlayerEvent(reply.clone())) {
                Ok(frame) => {
                    if direct.try_send(frame).is_err() {
                        tracing::warn!(%player_id, "direct queue full, dropping join reply");
                    }
                }
                Err(e) => tracing::warn!("failed to encode join reply: {e}"),
            }

            broadcast_lobby_state(&state.presence, &state.hub).await;
            state.hub.broadcast_message(&GameMessage::Announcement(Announcement {
                text: format!("{name} entered the arena"),
                sent_at: chrono::Utc::now().timestamp(),
            }));

            // Signal the join to the other processes.
            if let Ok(frame) = encode_message(&GameMessage::PlayerEvent(reply)) {
                if let Err(e) = state.bus.publish(CHANNEL_CHAT_GAME, &frame).await {
                    tracing::warn!(%player_id, "join publish failed: {e}");
                }
            }
        }
        PlayerEventKind::Input => {
            let action = match event.input {
                Some(a) => a,
                None => {
                    tracing::warn!(%player_id, "INPUT event without input payload");
                    return;
                }
            };
            let mut world = state.world.lock().unwrap();
            world.set_input(&player_id, action.input, action.pressed);
        }
        PlayerEventKind::Move => {
            // Client-asserted positions are untrusted and ignored.
            tracing::debug!(%player_id, "ignoring client MOVE event");
        }
        PlayerEventKind::Action => {
            let target = event.action.and_then(|a| a.target);
            match target {
                Some(t) => {
                    let mut world = state.world.lock().unwrap();
                    world.throw_potion(&player_id, t.x, t.y, Instant::now());
                }
                None => {
                    tracing::warn!(%player_id, "ACTION event without target");
                }
            }
        }
        PlayerEventKind::Leave => {
            let name = {
                let mut world = state.world.lock().unwrap();
                let name = world.player(&player_id).map(|p| p.name.clone());
                world.remove_player(&player_id);
                metrics::WORLD_PLAYERS.set(world.players().count() as i64);
                name
            };

            if let Err(e) = state.presence.move_to_lobby(&player_id).await {
                tracing::warn!(%player_id, "presence move_to_lobby failed: {e}");
            }
            broadcast_lobby_state(&state.presence, &state.hub).await;

            if let Some(name) = name {
                state.hub.broadcast_message(&GameMessage::Announcement(Announcement {
                    text: format!("{name} left the arena"),
                    sent_at: chrono::Utc::now().timestamp(),
                }));
            }

            let leave = PlayerEvent::bare(PlayerEventKind::Leave, &player_id);
            if let Ok(frame) = encode_message(&GameMessage::PlayerEvent(leave)) {
                if let Err(e) = state.bus.publish(CHANNEL_CHAT_GAME, &frame).await {
                    tracing::warn!(%player_id, "leave publish failed: {e}");
                }
            }
        }
        PlayerEventKind::Ready => {
            let ready = match state.presence.is_ready(&player_id).await {
                Ok(r) => !r,
                Err(e) => {
                    tracing::warn!(%player_id, "ready lookup failed: {e}");
                    return;
                }
            };
            if let Err(e) = state.presence.set_ready(&player_id, ready).await {
                tracing::warn!(%player_id, "ready update failed: {e}");
                return;
            }
            broadcast_lobby_state(&state.presence, &state.hub).await;
        }
    }
}
