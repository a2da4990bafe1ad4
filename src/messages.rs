// Wire protocol: binary frames carrying one or more length-delimited
// GameMessage records. Frames travel over websocket binary messages and,
// unchanged, over the pubsub bus.

use serde::{Deserialize, Serialize};

/// A 2D position on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

/// Movement inputs a client can press or release.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
}

/// A single key edge: which input changed and its new level.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputAction {
    pub input: InputKind,
    pub pressed: bool,
}

/// Discrete in-game actions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameActionKind {
    ThrowPotion,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    pub kind: GameActionKind,
    pub target: Option<Vec2>,
}

/// Player event sub-types. MOVE is accepted on the wire but ignored by the
/// server (client-asserted positions are untrusted).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEventKind {
    Join,
    Leave,
    Input,
    Move,
    Action,
    Ready,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerEvent {
    pub kind: PlayerEventKind,
    pub player_id: String,
    pub position: Option<Vec2>,
    pub input: Option<InputAction>,
    pub action: Option<GameAction>,
}

impl PlayerEvent {
    /// An event with no payload beyond the sub-type and player id.
    pub fn bare(kind: PlayerEventKind, player_id: &str) -> Self {
        PlayerEvent {
            kind,
            player_id: player_id.to_string(),
            position: None,
            input: None,
            action: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Filled in by the server from the sender's session.
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub sent_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub text: String,
    pub sent_at: i64,
}

// --- Snapshot payloads (server -> client) ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub position: Vec2,
    pub is_frozen: bool,
    /// Unix seconds, 0 when not frozen.
    pub frozen_until: i64,
    pub aloe_count: u32,
    /// Unix seconds, 0 when no boost is running.
    pub speed_boost_until: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: u64,
    pub kind: String,
    pub position: Vec2,
    pub target: Vec2,
    pub owner_id: String,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: u64,
    pub kind: String,
    pub position: Vec2,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuicksandSnapshot {
    /// Covered tiles as (tx, ty) pairs.
    pub tiles: Vec<(u32, u32)>,
    pub expires_at: i64,
    pub tile_id: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub players: Vec<PlayerSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub items: Vec<ItemSnapshot>,
    pub quicksand: Option<QuicksandSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LobbyUser {
    pub user_id: String,
    pub name: String,
    pub is_ready: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LobbyStatePayload {
    pub lobby_users: Vec<LobbyUser>,
    pub game_users: Vec<LobbyUser>,
}

/// Top-level wire message. The enum tag is the message type; the variant
/// payload is the message body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameMessage {
    Chat(ChatMessage),
    PlayerEvent(PlayerEvent),
    GameState(GameStatePayload),
    LobbyState(LobbyStatePayload),
    Announcement(Announcement),
}

// --- Framing ---

/// Maximum number of length-delimited records accepted in one frame.
const MAX_RECORDS_PER_FRAME: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame truncated")]
    Truncated,
    #[error("too many records in frame")]
    TooManyRecords,
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Encode a batch of messages into one frame: each record is a 4-byte LE
/// length followed by the bincode body. The write pump uses this to coalesce
/// messages queued while a write was in flight.
pub fn encode_frame(messages: &[GameMessage]) -> Result<Vec<u8>, WireError> {
    let mut frame = Vec::new();
    for msg in messages {
        let body = bincode::serialize(msg)?;
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
    }
    Ok(frame)
}

/// Encode a single message as a one-record frame.
pub fn encode_message(message: &GameMessage) -> Result<Vec<u8>, WireError> {
    encode_frame(std::slice::from_ref(message))
}

/// Decode every record in a frame.
pub fn decode_frame(frame: &[u8]) -> Result<Vec<GameMessage>, WireError> {
    let mut messages = Vec::new();
    let mut rest = frame;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(WireError::Truncated);
        }
        let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        rest = &rest[4..];
        if rest.len() < len {
            return Err(WireError::Truncated);
        }
        if messages.len() >= MAX_RECORDS_PER_FRAME {
            return Err(WireError::TooManyRecords);
        }
        messages.push(bincode::deserialize(&rest[..len])?);
        rest = &rest[len..];
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_message_frame() {
        let msg = GameMessage::PlayerEvent(PlayerEvent {
            kind: PlayerEventKind::Input,
            player_id: "42".into(),
            position: None,
            input: Some(InputAction {
                input: InputKind::MoveRight,
                pressed: true,
            }),
            action: None,
        });
        let frame = encode_message(&msg).unwrap();
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn test_coalesced_frame() {
        let a = GameMessage::Announcement(Announcement {
            text: "one".into(),
            sent_at: 1,
        });
        let b = GameMessage::Chat(ChatMessage {
            sender_id: "7".into(),
            sender_name: "seven".into(),
            text: "hi".into(),
            sent_at: 2,
        });
        let frame = encode_frame(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(decode_frame(&frame).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let msg = GameMessage::Announcement(Announcement {
            text: "x".into(),
            sent_at: 0,
        });
        let frame = encode_message(&msg).unwrap();
        assert!(matches!(
            decode_frame(&frame[..frame.len() - 1]),
            Err(WireError::Truncated)
        ));
        assert!(matches!(decode_frame(&[1, 0]), Err(WireError::Truncated)));
    }

    #[test]
    fn test_empty_frame_is_empty() {
        assert!(decode_frame(&[]).unwrap().is_empty());
    }
}
