//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Close code for policy violations (missing/duplicate name, invalid move)
pub use axum::extract::ws::close_code::POLICY as CLOSE_POLICY_VIOLATION;
/// Close code for internal errors (match allocation, routing, socket failure)
pub use axum::extract::ws::close_code::ERROR as CLOSE_INTERNAL_ERROR;

/// Paddle movement requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Up,
    Down,
}

impl Move {
    /// Vertical direction on screen coordinates (y grows downwards)
    pub fn direction(self) -> f32 {
        match self {
            Move::Up => -1.0,
            Move::Down => 1.0,
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "up" => Some(Move::Up),
            "down" => Some(Move::Down),
            _ => None,
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Move the sender's paddle one step
    MovePlayer {
        #[serde(rename = "move")]
        direction: Move,
    },
}

/// Loose shape used to tell an invalid move apart from an unknown message
#[derive(Debug, Deserialize)]
struct RawClientMsg {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "move", default)]
    direction: Option<serde_json::Value>,
}

impl ClientMsg {
    /// Decode a text frame received from a client
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawClientMsg = serde_json::from_str(text)?;

        match raw.kind.as_str() {
            "movePlayer" => {
                let token = raw
                    .direction
                    .map(|value| match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_default();

                Move::parse(&token)
                    .map(|direction| ClientMsg::MovePlayer { direction })
                    .ok_or(ProtocolError::InvalidMove(token))
            }
            _ => Err(ProtocolError::UnknownType(raw.kind)),
        }
    }
}

/// Errors decoding client frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid move: {0:?}")]
    InvalidMove(String),
}

/// Acknowledgement sent right after a successful join.
/// Deliberately untagged: clients detect it by the presence of `matchId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    pub match_id: Uuid,
    pub player_name: String,
}

/// Messages sent from server to client once a player belongs to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Full state snapshot, sent every tick while the match runs
    GameState {
        #[serde(rename = "gameState")]
        game_state: MatchState,
    },

    /// Terminal message naming the winner
    Winner { winner: String },
}

/// Paddle position. `x` is fixed per side, only `y` moves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
}

/// Ball position, velocity (per tick) and current speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub left: u32,
    pub right: u32,
}

/// The unit broadcast to clients: always a complete copy, never a delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub left_paddle: Paddle,
    pub right_paddle: Paddle,
    pub ball: Ball,
    pub score: Score,
    pub is_ended: bool,
    pub is_single_player: bool,
}
