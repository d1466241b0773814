//! Computer opponent for single-player matches

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;

use crate::ws::protocol::{Ball, Move, Paddle};

use super::physics::{FieldConfig, Side};

/// Tuning for [`ReactiveAi`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiConfig {
    /// Ignore vertical offsets smaller than this
    pub deadzone: f32,
    /// Minimum real time between two moves
    pub debounce: Duration,
    /// Probability of skipping a move it would otherwise make
    pub skip_chance: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            deadzone: 10.0,
            debounce: Duration::from_millis(100),
            skip_chance: 0.1,
        }
    }
}

/// What an opponent policy gets to look at each tick
#[derive(Debug, Clone, Copy)]
pub struct PolicyView<'a> {
    pub side: Side,
    pub ball: &'a Ball,
    pub paddle: &'a Paddle,
    pub field: &'a FieldConfig,
}

/// Decides the computer-controlled paddle's move for a tick
pub trait OpponentPolicy: Send {
    fn next_move(&mut self, view: PolicyView<'_>, now: Instant) -> Option<Move>;
}

/// Chases the ball's height while it approaches, with a reaction delay and
/// occasional misses
pub struct ReactiveAi {
    config: AiConfig,
    rng: ChaCha8Rng,
    last_move: Option<Instant>,
}

impl ReactiveAi {
    pub fn new(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_move: None,
        }
    }
}

impl OpponentPolicy for ReactiveAi {
    fn next_move(&mut self, view: PolicyView<'_>, now: Instant) -> Option<Move> {
        let approaching = match view.side {
            Side::Left => view.ball.vx < 0.0,
            Side::Right => view.ball.vx > 0.0,
        };
        if !approaching {
            return None;
        }

        let paddle_center = view.paddle.y + view.field.paddle_height / 2.0;
        let distance = view.ball.y - paddle_center;
        if distance.abs() < self.config.deadzone {
            return None;
        }

        if let Some(last) = self.last_move {
            if now.duration_since(last) < self.config.debounce {
                return None;
            }
        }

        if self.rng.gen_bool(self.config.skip_chance.clamp(0.0, 1.0)) {
            return None;
        }

        self.last_move = Some(now);
        Some(if distance < 0.0 { Move::Up } else { Move::Down })
    }
}
