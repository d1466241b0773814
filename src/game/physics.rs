//! Ball and paddle physics for a single Pong field

use std::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ws::protocol::{Ball, Move, Paddle, Score};

/// Maximum deflection off a paddle edge (±60°)
pub const MAX_BOUNCE_ANGLE: f32 = PI / 3.0;
/// Maximum launch angle after a point (±30°)
pub const MAX_LAUNCH_ANGLE: f32 = PI / 6.0;

/// Which half of the field a paddle defends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Field geometry and movement constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldConfig {
    pub width: f32,
    pub height: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    pub ball_radius: f32,
    /// Distance a paddle travels per move
    pub paddle_step: f32,
    /// Ball speed (per tick) at every launch
    pub base_speed: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 500.0,
            paddle_width: 10.0,
            paddle_height: 100.0,
            ball_radius: 10.0,
            paddle_step: 20.0,
            base_speed: 10.0,
        }
    }
}

impl FieldConfig {
    /// Paddle y that centers it vertically
    pub fn centered_paddle_y(&self) -> f32 {
        (self.height - self.paddle_height) / 2.0
    }

    /// Largest valid paddle y
    pub fn max_paddle_y(&self) -> f32 {
        self.height - self.paddle_height
    }
}

/// How the ball speed evolves during a rally
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedProfile {
    /// Casual: the launch speed is kept for the whole rally
    Constant,
    /// Ranked: speed grows by `increment` every tick until the next point
    Ramp { increment: f32 },
}

/// Result of a single physics step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Ball kept flying (possibly bouncing off a wall)
    InPlay,
    /// Ball was returned by the paddle on this side
    PaddleHit(Side),
    /// This side scored a point
    Scored(Side),
}

/// Authoritative simulation of one field
#[derive(Debug, Clone)]
pub struct PhysicsEngine {
    field: FieldConfig,
    speed_profile: SpeedProfile,
    left: Paddle,
    right: Paddle,
    ball: Ball,
    score: Score,
    rng: ChaCha8Rng,
}

impl PhysicsEngine {
    /// Create a field with centered paddles and a freshly launched ball
    pub fn new(field: FieldConfig, speed_profile: SpeedProfile, seed: u64) -> Self {
        let paddle_y = field.centered_paddle_y();
        let mut engine = Self {
            field,
            speed_profile,
            left: Paddle { x: 0.0, y: paddle_y },
            right: Paddle {
                x: field.width - field.paddle_width,
                y: paddle_y,
            },
            ball: Ball {
                x: field.width / 2.0,
                y: field.height / 2.0,
                vx: 0.0,
                vy: 0.0,
                speed: field.base_speed,
            },
            score: Score::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        engine.launch_ball();
        engine
    }

    pub fn field(&self) -> &FieldConfig {
        &self.field
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    /// Move a paddle one step, clamped to the field
    pub fn move_paddle(&mut self, side: Side, direction: Move) {
        let step = self.field.paddle_step * direction.direction();
        let max_y = self.field.max_paddle_y();
        let paddle = self.paddle_mut(side);
        paddle.y = (paddle.y + step).clamp(0.0, max_y);
    }

    /// Advance the simulation by one tick
    pub fn step(&mut self) -> StepOutcome {
        self.apply_speed_profile();

        let r = self.field.ball_radius;
        let previous_x = self.ball.x;

        self.ball.x += self.ball.vx;
        self.ball.y += self.ball.vy;

        // Top and bottom walls
        if self.ball.y - r <= 0.0 {
            self.ball.y = r;
            self.ball.vy = self.ball.vy.abs();
        } else if self.ball.y + r >= self.field.height {
            self.ball.y = self.field.height - r;
            self.ball.vy = -self.ball.vy.abs();
        }

        // Paddles take priority over scoring
        if let Some(side) = self.paddle_contact(previous_x) {
            self.reflect_off(side);
            return StepOutcome::PaddleHit(side);
        }

        if self.ball.x - r <= 0.0 {
            self.award_point(Side::Right);
            return StepOutcome::Scored(Side::Right);
        }
        if self.ball.x + r >= self.field.width {
            self.award_point(Side::Left);
            return StepOutcome::Scored(Side::Left);
        }

        StepOutcome::InPlay
    }

    fn apply_speed_profile(&mut self) {
        if let SpeedProfile::Ramp { increment } = self.speed_profile {
            debug_assert!(increment > 0.0, "ramp increment must be positive");
            let new_speed = self.ball.speed + increment;
            if self.ball.speed > 0.0 {
                let scale = new_speed / self.ball.speed;
                self.ball.vx *= scale;
                self.ball.vy *= scale;
            }
            self.ball.speed = new_speed;
        }
    }

    /// Paddle the ball is moving toward and vertically within, whose x-range
    /// holds the ball's leading edge or whose face that edge crossed this tick
    fn paddle_contact(&self, previous_x: f32) -> Option<Side> {
        let r = self.field.ball_radius;
        let pw = self.field.paddle_width;
        let ball = &self.ball;

        if ball.vx < 0.0 {
            let (back, face) = (self.left.x, self.left.x + pw);
            let edge = ball.x - r;
            let overlaps = edge >= back && edge <= face;
            let crossed = previous_x - r >= face && edge <= face;
            if (overlaps || crossed) && self.within_paddle(Side::Left) {
                return Some(Side::Left);
            }
        } else if ball.vx > 0.0 {
            let (face, back) = (self.right.x, self.right.x + pw);
            let edge = ball.x + r;
            let overlaps = edge >= face && edge <= back;
            let crossed = previous_x + r <= face && edge >= face;
            if (overlaps || crossed) && self.within_paddle(Side::Right) {
                return Some(Side::Right);
            }
        }

        None
    }

    fn within_paddle(&self, side: Side) -> bool {
        let paddle = self.paddle(side);
        self.ball.y >= paddle.y && self.ball.y <= paddle.y + self.field.paddle_height
    }

    fn reflect_off(&mut self, side: Side) {
        let paddle = *self.paddle(side);
        let r = self.field.ball_radius;
        let speed = self.ball.speed;

        let hit_pos = ((self.ball.y - paddle.y) / self.field.paddle_height).clamp(0.0, 1.0);
        let angle = (hit_pos - 0.5) * MAX_BOUNCE_ANGLE;

        let away = match side {
            Side::Left => 1.0,
            Side::Right => -1.0,
        };
        self.ball.vx = away * angle.cos().abs() * speed;
        self.ball.vy = angle.sin() * speed;

        self.ball.x = match side {
            Side::Left => paddle.x + self.field.paddle_width + r,
            Side::Right => paddle.x - r,
        };
    }

    fn award_point(&mut self, scorer: Side) {
        match scorer {
            Side::Left => self.score.left += 1,
            Side::Right => self.score.right += 1,
        }

        let paddle_y = self.field.centered_paddle_y();
        self.left.y = paddle_y;
        self.right.y = paddle_y;

        self.launch_ball();
    }

    /// Recenter the ball and send it left or right at a random shallow angle
    fn launch_ball(&mut self) {
        let speed = self.field.base_speed;
        let angle = self.rng.gen_range(-MAX_LAUNCH_ANGLE..=MAX_LAUNCH_ANGLE);
        let direction = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };

        self.ball = Ball {
            x: self.field.width / 2.0,
            y: self.field.height / 2.0,
            vx: direction * angle.cos() * speed,
            vy: angle.sin() * speed,
            speed,
        };
    }
}

#[cfg(test)]
impl PhysicsEngine {
    pub(crate) fn set_ball(&mut self, ball: Ball) {
        self.ball = ball;
    }

    pub(crate) fn set_paddle_y(&mut self, side: Side, y: f32) {
        self.paddle_mut(side).y = y;
    }

    pub(crate) fn set_score(&mut self, score: Score) {
        self.score = score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PhysicsEngine {
        PhysicsEngine::new(FieldConfig::default(), SpeedProfile::Constant, 7)
    }

    fn ball(x: f32, y: f32, vx: f32, vy: f32) -> Ball {
        Ball {
            x,
            y,
            vx,
            vy,
            speed: (vx * vx + vy * vy).sqrt(),
        }
    }

    fn assert_launched(engine: &PhysicsEngine) {
        let field = engine.field();
        let b = engine.ball();
        assert_eq!(b.x, field.width / 2.0);
        assert_eq!(b.y, field.height / 2.0);
        assert_eq!(b.speed, field.base_speed);
        let magnitude = (b.vx * b.vx + b.vy * b.vy).sqrt();
        assert!((magnitude - field.base_speed).abs() < 1e-3);
        let angle = (b.vy / b.vx.abs()).atan();
        assert!(angle.abs() <= MAX_LAUNCH_ANGLE + 1e-4);
    }

    #[test]
    fn new_engine_is_centered_and_launched() {
        let e = engine();
        assert_eq!(e.paddle(Side::Left).y, 200.0);
        assert_eq!(e.paddle(Side::Right).y, 200.0);
        assert_eq!(e.paddle(Side::Right).x, 990.0);
        assert_eq!(e.score(), Score::default());
        assert_launched(&e);
    }

    #[test]
    fn launch_is_deterministic_for_a_seed() {
        let a = PhysicsEngine::new(FieldConfig::default(), SpeedProfile::Constant, 42);
        let b = PhysicsEngine::new(FieldConfig::default(), SpeedProfile::Constant, 42);
        assert_eq!(a.ball(), b.ball());
    }

    #[test]
    fn launches_cover_both_directions() {
        let (mut left, mut right) = (0, 0);
        for seed in 0..64 {
            let e = PhysicsEngine::new(FieldConfig::default(), SpeedProfile::Constant, seed);
            if e.ball().vx < 0.0 {
                left += 1;
            } else {
                right += 1;
            }
        }
        assert!(left > 0 && right > 0);
    }

    #[test]
    fn paddle_stays_within_bounds() {
        let mut e = engine();
        let max_y = e.field().max_paddle_y();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..500 {
            let direction = if rng.gen_bool(0.5) { Move::Up } else { Move::Down };
            let side = if rng.gen_bool(0.5) { Side::Left } else { Side::Right };
            e.move_paddle(side, direction);
            for s in [Side::Left, Side::Right] {
                let y = e.paddle(s).y;
                assert!((0.0..=max_y).contains(&y), "paddle y {y} out of bounds");
            }
        }
    }

    #[test]
    fn paddle_clamps_at_edges() {
        let mut e = engine();
        for _ in 0..50 {
            e.move_paddle(Side::Left, Move::Up);
        }
        assert_eq!(e.paddle(Side::Left).y, 0.0);

        e.move_paddle(Side::Left, Move::Down);
        assert_eq!(e.paddle(Side::Left).y, 20.0);

        e.set_paddle_y(Side::Right, 395.0);
        e.move_paddle(Side::Right, Move::Down);
        assert_eq!(e.paddle(Side::Right).y, 400.0);
    }

    #[test]
    fn bounces_off_top_and_bottom_walls() {
        let mut e = engine();
        e.set_ball(ball(500.0, 12.0, 3.0, -5.0));
        assert_eq!(e.step(), StepOutcome::InPlay);
        assert_eq!(e.ball().y, 10.0);
        assert!(e.ball().vy > 0.0);

        e.set_ball(ball(500.0, 487.0, 3.0, 5.0));
        assert_eq!(e.step(), StepOutcome::InPlay);
        assert_eq!(e.ball().y, 490.0);
        assert!(e.ball().vy < 0.0);
    }

    #[test]
    fn left_paddle_returns_ball_without_scoring() {
        let mut e = engine();
        e.set_paddle_y(Side::Left, 200.0);
        e.set_ball(ball(24.0, 250.0, -14.1, 7.1));

        let outcome = e.step();

        assert_eq!(outcome, StepOutcome::PaddleHit(Side::Left));
        assert!(e.ball().vx > 0.0);
        assert_eq!(e.ball().x, 20.0);
        assert_eq!(e.score(), Score::default());
    }

    #[test]
    fn right_paddle_reflects_toward_left() {
        let mut e = engine();
        e.set_paddle_y(Side::Right, 200.0);
        e.set_ball(ball(975.0, 240.0, 10.0, 0.0));

        assert_eq!(e.step(), StepOutcome::PaddleHit(Side::Right));
        assert!(e.ball().vx < 0.0);
        assert_eq!(e.ball().x, 980.0);
        assert_eq!(e.score(), Score::default());
    }

    #[test]
    fn reflection_angle_follows_hit_position() {
        // Hitting the very top of the paddle gives the steepest upward angle
        let mut e = engine();
        e.set_paddle_y(Side::Left, 200.0);
        e.set_ball(ball(25.0, 200.0, -10.0, 0.0));
        e.step();
        let b = *e.ball();
        let angle = (b.vy / b.vx).atan();
        assert!((angle + MAX_BOUNCE_ANGLE / 2.0).abs() < 1e-4);

        // Dead center returns it flat
        e.set_ball(ball(25.0, 250.0, -10.0, 0.0));
        e.step();
        assert!(e.ball().vy.abs() < 1e-4);
        assert!((e.ball().vx - 10.0).abs() < 1e-4);
    }

    #[test]
    fn reflection_is_bounded_and_points_away() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut e = engine();

        for _ in 0..200 {
            let side = if rng.gen_bool(0.5) { Side::Left } else { Side::Right };
            let paddle_y = rng.gen_range(0.0..=400.0);
            let y = (paddle_y + rng.gen_range(0.0..=100.0f32)).clamp(10.5, 489.5);
            let speed = rng.gen_range(5.0..20.0f32);
            e.set_paddle_y(side, paddle_y);

            let (x, vx) = match side {
                Side::Left => (20.0 + speed * 0.5, -speed),
                Side::Right => (980.0 - speed * 0.5, speed),
            };
            e.set_ball(ball(x, y, vx, 0.0));

            if e.step() == StepOutcome::PaddleHit(side) {
                let b = e.ball();
                let angle = (b.vy / b.vx.abs()).atan();
                assert!(angle.abs() <= MAX_BOUNCE_ANGLE + 1e-4);
                match side {
                    Side::Left => assert!(b.vx > 0.0),
                    Side::Right => assert!(b.vx < 0.0),
                }
                assert_eq!(e.score(), Score::default());
            }
        }
    }

    #[test]
    fn ball_moving_away_from_paddle_is_not_reflected() {
        let mut e = engine();
        e.set_paddle_y(Side::Left, 200.0);
        e.set_ball(ball(25.0, 250.0, 5.0, 0.0));
        assert_eq!(e.step(), StepOutcome::InPlay);
        assert_eq!(e.ball().vx, 5.0);
    }

    #[test]
    fn exiting_right_edge_scores_for_left_and_resets() {
        let mut e = engine();
        e.set_paddle_y(Side::Right, 0.0);
        e.set_paddle_y(Side::Left, 400.0);
        e.set_ball(ball(985.0, 400.0, 20.0, 0.0));

        assert_eq!(e.step(), StepOutcome::Scored(Side::Left));
        assert_eq!(e.score(), Score { left: 1, right: 0 });
        assert_eq!(e.paddle(Side::Left).y, 200.0);
        assert_eq!(e.paddle(Side::Right).y, 200.0);
        assert_launched(&e);
    }

    #[test]
    fn exiting_left_edge_scores_for_right() {
        let mut e = engine();
        e.set_paddle_y(Side::Left, 0.0);
        e.set_ball(ball(30.0, 450.0, -25.0, 0.0));

        assert_eq!(e.step(), StepOutcome::Scored(Side::Right));
        assert_eq!(e.score(), Score { left: 0, right: 1 });
        assert_launched(&e);
    }

    #[test]
    fn collision_and_score_are_exclusive() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut e = engine();

        for _ in 0..1_000 {
            let before = e.score();
            let moves = rng.gen_range(0..3);
            for _ in 0..moves {
                let direction = if rng.gen_bool(0.5) { Move::Up } else { Move::Down };
                e.move_paddle(Side::Left, direction);
                e.move_paddle(Side::Right, direction);
            }

            let after_outcome = e.step();
            let after = e.score();
            let points = (after.left + after.right) - (before.left + before.right);
            match after_outcome {
                StepOutcome::PaddleHit(_) | StepOutcome::InPlay => assert_eq!(points, 0),
                StepOutcome::Scored(_) => assert_eq!(points, 1),
            }
        }
    }

    #[test]
    fn constant_profile_keeps_speed() {
        let mut e = engine();
        let speed = e.ball().speed;
        e.set_ball(ball(500.0, 250.0, speed, 0.0));
        for _ in 0..10 {
            e.step();
        }
        assert_eq!(e.ball().speed, speed);
    }

    #[test]
    fn ramp_profile_increases_speed_every_tick() {
        let mut e = PhysicsEngine::new(
            FieldConfig::default(),
            SpeedProfile::Ramp { increment: 0.5 },
            1,
        );
        e.set_ball(ball(500.0, 250.0, 10.0, 0.0));

        e.step();
        assert!((e.ball().speed - 10.5).abs() < 1e-4);
        assert!((e.ball().vx - 10.5).abs() < 1e-4);
        assert!((e.ball().x - 510.5).abs() < 1e-3);

        e.step();
        assert!((e.ball().speed - 11.0).abs() < 1e-4);
    }

    #[test]
    fn ramp_resets_to_base_speed_after_a_point() {
        let mut e = PhysicsEngine::new(
            FieldConfig::default(),
            SpeedProfile::Ramp { increment: 1.0 },
            1,
        );
        e.set_paddle_y(Side::Right, 0.0);
        e.set_ball(ball(970.0, 400.0, 30.0, 0.0));

        assert_eq!(e.step(), StepOutcome::Scored(Side::Left));
        assert_eq!(e.ball().speed, e.field().base_speed);
    }

    #[test]
    fn paddle_moving_under_ball_inside_its_reach_returns_it() {
        let mut e = engine();
        e.set_paddle_y(Side::Left, 0.0);
        e.set_ball(ball(22.0, 250.0, -4.0, 0.0));

        // Edge passes the face while the paddle is elsewhere
        assert_eq!(e.step(), StepOutcome::InPlay);
        assert_eq!(e.ball().x - e.field().ball_radius, 8.0);

        e.set_paddle_y(Side::Left, 200.0);
        assert_eq!(e.step(), StepOutcome::PaddleHit(Side::Left));
        assert!(e.ball().vx > 0.0);
        assert_eq!(e.ball().x, 20.0);
        assert_eq!(e.score(), Score::default());
    }

    #[test]
    fn right_paddle_catches_ball_already_past_its_face() {
        let mut e = engine();
        e.set_paddle_y(Side::Right, 200.0);
        e.set_ball(ball(981.0, 250.0, 2.0, 0.0));

        assert_eq!(e.step(), StepOutcome::PaddleHit(Side::Right));
        assert!(e.ball().vx < 0.0);
        assert_eq!(e.score(), Score::default());
    }

    #[test]
    fn fast_ball_cannot_tunnel_through_paddle() {
        let mut e = engine();
        e.set_paddle_y(Side::Right, 200.0);
        // Would land well past the right edge in a single tick
        e.set_ball(ball(960.0, 250.0, 60.0, 0.0));

        assert_eq!(e.step(), StepOutcome::PaddleHit(Side::Right));
        assert_eq!(e.score(), Score::default());
    }
}
