// Cross-process pubsub bus over redis. Chat and player events from every
// server process land on two shared channels; each process mirrors them to
// its local clients. Delivery is at-least-once, so handlers must stay
// idempotent: chat re-broadcast is idempotent by content, and lobby state is
// always recomputed locally rather than patched from bus messages.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::ServerError;
use crate::hub::Hub;
use crate::messages::{decode_frame, GameMessage, PlayerEventKind};
use crate::presence::PresenceStore;
use crate::router::broadcast_lobby_state;

pub const CHANNEL_CHAT_LOBBY: &str = "chat.lobby";
pub const CHANNEL_CHAT_GAME: &str = "chat.game";

#[derive(Clone)]
pub struct PubSubBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl PubSubBus {
    pub async fn connect(redis_url: &str) -> Result<Self, ServerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(PubSubBus { client, conn })
    }

    /// Publish a wire frame to a channel. Fire-and-forget from the caller's
    /// perspective; failures are surfaced as errors for logging only.
    pub async fn publish(&self, channel: &str, frame: &[u8]) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, frame).await?;
        Ok(())
    }

    /// Spawn one subscriber task per chat channel. The loops reconnect on
    /// failure and never take the process down.
    pub fn spawn_subscribers(&self, hub: Arc<Hub>, presence: PresenceStore) {
        for channel in [CHANNEL_CHAT_LOBBY, CHANNEL_CHAT_GAME] {
            spawn_subscriber(self.client.clone(), channel, hub.clone(), presence.clone());
        }
    }
}

fn spawn_subscriber(
    client: redis::Client,
    channel: &'static str,
    hub: Arc<Hub>,
    presence: PresenceStore,
) {
    tokio::spawn(async move {
        loop {
            match client.get_async_pubsub().await {
                Ok(mut pubsub) => {
                    if let Err(e) = pubsub.subscribe(channel).await {
                        tracing::warn!(channel, "pubsub subscribe failed: {e}");
                    } else {
                        tracing::info!(channel, "pubsub subscriber connected");
                        let mut stream = pubsub.on_message();
                        while let Some(msg) = stream.next().await {
                            let payload: Vec<u8> = match msg.get_payload() {
                                Ok(p) => p,
                                Err(e) => {
                                    tracing::warn!(channel, "bad pubsub payload: {e}");
                                    continue;
                                }
                            };
                            handle_bus_frame(channel, &payload, &hub, &presence).await;
                        }
                        tracing::warn!(channel, "pubsub stream ended, reconnecting");
                    }
                }
                Err(e) => {
                    tracing::warn!(channel, "pubsub connect failed: {e}");
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });
}

/// Mirror one bus frame to local clients.
async fn handle_bus_frame(channel: &str, frame: &[u8], hub: &Hub, presence: &PresenceStore) {
    let messages = match decode_frame(frame) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(channel, "undecodable bus frame: {e}");
            return;
        }
    };
    for message in messages {
        match message {
            chat @ GameMessage::Chat(_) => {
                hub.broadcast_message(&chat);
            }
            GameMessage::PlayerEvent(event)
                if matches!(event.kind, PlayerEventKind::Join | PlayerEventKind::Leave) =>
            {
                // The membership change already happened in the shared
                // presence store; re-derive the lobby state from it.
                broadcast_lobby_state(presence, hub).await;
            }
            other => {
                tracing::debug!(channel, kind = ?message_kind(&other), "ignoring bus message");
            }
        }
    }
}

fn message_kind(message: &GameMessage) -> &'static str {
    match message {
        GameMessage::Chat(_) => "chat",
        GameMessage::PlayerEvent(_) => "player_event",
        GameMessage::GameState(_) => "game_state",
        GameMessage::LobbyState(_) => "lobby_state",
        GameMessage::Announcement(_) => "announcement",
    }
}
