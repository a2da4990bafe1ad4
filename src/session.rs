// Redis-backed session store. The REST collaborator issues tokens; the
// realtime server only looks them up during the websocket handshake and
// refreshes them on heartbeat.

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

const SESSION_KEY_PREFIX: &str = "session:";

/// Resolved session data stored behind a token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub name: String,
    pub is_guest: bool,
}

/// Generate a fresh 32-byte random token, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Generate an opaque guest id.
fn generate_guest_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("Guest-{}", &suffix[..4])
}

#[derive(Clone)]
pub struct SessionStore {
    conn: ConnectionManager,
    /// Session TTL in seconds.
    max_age: u64,
}

impl SessionStore {
    pub async fn connect(redis_url: &str, max_age: u64) -> Result<Self, ServerError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(SessionStore { conn, max_age })
    }

    fn key(token: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{token}")
    }

    async fn store(&self, token: &str, session: &Session) -> Result<(), ServerError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| ServerError::Session(e.to_string()))?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(Self::key(token), payload, self.max_age).await?;
        Ok(())
    }

    /// Create a session for an authenticated user. Returns the token.
    pub async fn create_session(&self, user_id: &str, name: &str) -> Result<String, ServerError> {
        let token = generate_token();
        let session = Session {
            user_id: user_id.to_string(),
            name: name.to_string(),
            is_guest: false,
        };
        self.store(&token, &session).await?;
        Ok(token)
    }

    /// Create a guest session. A fresh guest id is minted unless the caller
    /// supplies one (reconnecting guests keep their id). Returns the token
    /// and the guest id.
    pub async fn create_guest_session(
        &self,
        guest_id: Option<String>,
    ) -> Result<(String, String), ServerError> {
        let guest_id = guest_id.unwrap_or_else(generate_guest_id);
        let token = generate_token();
        let session = Session {
            user_id: guest_id.clone(),
            name: guest_id.clone(),
            is_guest: true,
        };
        self.store(&token, &session).await?;
        Ok((token, guest_id))
    }

    /// Look up a token. Returns None when the token is unknown or expired.
    pub async fn lookup(&self, token: &str) -> Result<Option<Session>, ServerError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(Self::key(token)).await?;
        match payload {
            Some(json) => {
                let session = serde_json::from_str(&json)
                    .map_err(|e| ServerError::Session(e.to_string()))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Extend a session's TTL. Returns false when the token is gone.
    pub async fn refresh(&self, token: &str) -> Result<bool, ServerError> {
        let mut conn = self.conn.clone();
        let updated: i64 = conn.expire(Self::key(token), self.max_age as i64).await?;
        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64); // 32 bytes hex encoded
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_guest_id_shape() {
        let id = generate_guest_id();
        assert!(id.starts_with("Guest-"));
        assert_eq!(id.len(), "Guest-".len() + 4);
    }

    #[test]
    fn test_session_roundtrip() {
        let session = Session {
            user_id: "42".into(),
            name: "alice".into(),
            is_guest: false,
        };
        let json = serde_json::to_string(&session).unwrap();
        assert_eq!(serde_json::from_str::<Session>(&json).unwrap(), session);
    }
}
