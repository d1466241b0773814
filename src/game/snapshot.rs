//! Snapshot building for network transmission

use crate::ws::protocol::{MatchState, ServerMsg};

use super::physics::{PhysicsEngine, Side};

/// Copy the engine's current state into a broadcastable snapshot
pub fn capture(engine: &PhysicsEngine, is_ended: bool, is_single_player: bool) -> MatchState {
    MatchState {
        left_paddle: *engine.paddle(Side::Left),
        right_paddle: *engine.paddle(Side::Right),
        ball: *engine.ball(),
        score: engine.score(),
        is_ended,
        is_single_player,
    }
}

/// Build the per-tick `gameState` message
pub fn game_state_msg(engine: &PhysicsEngine, is_ended: bool, is_single_player: bool) -> ServerMsg {
    ServerMsg::GameState {
        game_state: capture(engine, is_ended, is_single_player),
    }
}
