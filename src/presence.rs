// Redis-backed presence store: which player ids sit in the lobby, which are
// in the game world, their display names, and their ready flags. Multiple
// server processes share these sets; every mutation is followed by a full
// lobby-state broadcast so clients never depend on deltas.

use std::collections::{HashMap, HashSet};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::ServerError;
use crate::messages::{LobbyStatePayload, LobbyUser};

const LOBBY_KEY: &str = "presence:lobby";
const GAME_KEY: &str = "presence:game";
const NAMES_KEY: &str = "presence:names";
const READY_KEY: &str = "presence:ready";

#[derive(Clone)]
pub struct PresenceStore {
    conn: ConnectionManager,
}

impl PresenceStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ServerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(PresenceStore { conn })
    }

    /// Drop all presence state. Called at startup so entries from a prior
    /// run do not linger.
    pub async fn clear(&self) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(LOBBY_KEY)
            .del(GAME_KEY)
            .del(NAMES_KEY)
            .del(READY_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Register a connecting player in the lobby and record their name.
    pub async fn add_to_lobby(&self, id: &str, name: &str) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .sadd(LOBBY_KEY, id)
            .hset(NAMES_KEY, id, name)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Atomically move a player from the lobby into the game set.
    pub async fn move_to_game(&self, id: &str) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(LOBBY_KEY, id)
            .sadd(GAME_KEY, id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Atomically move a player from the game set back to the lobby.
    pub async fn move_to_lobby(&self, id: &str) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(GAME_KEY, id)
            .sadd(LOBBY_KEY, id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove a disconnected player from every set.
    pub async fn remove(&self, id: &str) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(LOBBY_KEY, id)
            .srem(GAME_KEY, id)
            .hdel(NAMES_KEY, id)
            .srem(READY_KEY, id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn lobby_members(&self) -> Result<Vec<String>, ServerError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(LOBBY_KEY).await?)
    }

    pub async fn game_members(&self) -> Result<Vec<String>, ServerError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(GAME_KEY).await?)
    }

    pub async fn name(&self, id: &str) -> Result<Option<String>, ServerError> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(NAMES_KEY, id).await?)
    }

    /// Set or clear a player's ready flag.
    pub async fn set_ready(&self, id: &str, ready: bool) -> Result<(), ServerError> {
        let mut conn = self.conn.clone();
        if ready {
            let _: () = conn.sadd(READY_KEY, id).await?;
        } else {
            let _: () = conn.srem(READY_KEY, id).await?;
        }
        Ok(())
    }

    pub async fn is_ready(&self, id: &str) -> Result<bool, ServerError> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(READY_KEY, id).await?)
    }

    /// Assemble the full lobby state for broadcast: both membership sets
    /// with names and ready flags, sorted by id for stable output.
    pub async fn lobby_state(&self) -> Result<LobbyStatePayload, ServerError> {
        let mut conn = self.conn.clone();
        let (lobby, game, names, ready): (
            Vec<String>,
            Vec<String>,
            HashMap<String, String>,
            Vec<String>,
        ) = redis::pipe()
            .smembers(LOBBY_KEY)
            .smembers(GAME_KEY)
            .hgetall(NAMES_KEY)
            .smembers(READY_KEY)
            .query_async(&mut conn)
            .await?;

        let ready: HashSet<String> = ready.into_iter().collect();
        let to_users = |mut ids: Vec<String>| -> Vec<LobbyUser> {
            ids.sort();
            ids.into_iter()
                .map(|id| LobbyUser {
                    name: names.get(&id).cloned().unwrap_or_else(|| id.clone()),
                    is_ready: ready.contains(&id),
                    user_id: id,
                })
                .collect()
        };

        Ok(LobbyStatePayload {
            lobby_users: to_users(lobby),
            game_users: to_users(game),
        })
    }
}
