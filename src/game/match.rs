//! Match session state machine and authoritative tick loop

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{Move, Score, ServerMsg};

use super::ai::{OpponentPolicy, PolicyView, ReactiveAi};
use super::physics::{PhysicsEngine, Side, StepOutcome};
use super::snapshot::game_state_msg;

/// Name reported when the computer opponent wins
pub const AI_PLAYER_NAME: &str = "AI";

/// Mixed into the match seed so the AI does not mirror the ball launches
const AI_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Kind of match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Two connected players
    Duel,
    /// One connected player against the computer
    SinglePlayer,
}

impl MatchMode {
    pub fn from_flag(is_single_player: bool) -> Self {
        if is_single_player {
            Self::SinglePlayer
        } else {
            Self::Duel
        }
    }

    /// Number of connected players needed to start
    pub fn capacity(self) -> usize {
        match self {
            Self::Duel => 2,
            Self::SinglePlayer => 1,
        }
    }

    pub fn is_single_player(self) -> bool {
        self == Self::SinglePlayer
    }
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Player slots still open
    WaitingForPlayers,
    /// Tick loop active
    Running,
    /// Winner declared or session shut down; never leaves this phase
    Ended,
}

/// A connected player as seen by its session
#[derive(Debug, Clone)]
pub struct PlayerLink {
    pub name: String,
    /// Outbound frames for this player's connection
    pub outbound: mpsc::Sender<ServerMsg>,
}

/// Requests processed by the session task, in order
#[derive(Debug)]
pub enum SessionCommand {
    AddPlayer(PlayerLink),
    Start,
    Input {
        player_name: String,
        direction: Move,
    },
    RemovePlayer {
        player_name: String,
    },
    /// Declare a winner; replies whether this call ended the match
    End {
        winner: String,
        done: oneshot::Sender<bool>,
    },
    /// Stop ticking and exit the task
    Shutdown { done: oneshot::Sender<()> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Match is full")]
    MatchFull,

    #[error("Cannot {action} a match that is {phase:?}")]
    InvalidTransition {
        action: &'static str,
        phase: MatchPhase,
    },

    #[error("Match needs {needed} players, has {present}")]
    NotEnoughPlayers { needed: usize, present: usize },

    #[error("Match session is closed")]
    Closed,
}

/// Handle to a running match
#[derive(Clone, Debug)]
pub struct MatchHandle {
    pub id: Uuid,
    pub mode: MatchMode,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl MatchHandle {
    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    pub fn add_player(&self, player: PlayerLink) -> Result<(), SessionError> {
        self.send(SessionCommand::AddPlayer(player))
    }

    pub fn start(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Start)
    }

    /// Forward a paddle move; the session ignores it unless running
    pub fn apply_input(&self, player_name: &str, direction: Move) -> Result<(), SessionError> {
        self.send(SessionCommand::Input {
            player_name: player_name.to_string(),
            direction,
        })
    }

    pub fn remove_player(&self, player_name: &str) -> Result<(), SessionError> {
        self.send(SessionCommand::RemovePlayer {
            player_name: player_name.to_string(),
        })
    }

    /// Queue an end request without waiting for it to be applied
    pub fn request_end(&self, winner: &str) -> Result<oneshot::Receiver<bool>, SessionError> {
        let (done, rx) = oneshot::channel();
        self.send(SessionCommand::End {
            winner: winner.to_string(),
            done,
        })?;
        Ok(rx)
    }

    /// End the match and wait until the tick loop has stopped
    pub async fn end(&self, winner: &str) -> Result<bool, SessionError> {
        self.request_end(winner)?
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub fn request_shutdown(&self) -> Result<oneshot::Receiver<()>, SessionError> {
        let (done, rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown { done })?;
        Ok(rx)
    }
}

/// The authoritative match session, owned by its own task
pub struct MatchSession {
    id: Uuid,
    mode: MatchMode,
    phase: MatchPhase,
    players: Vec<PlayerLink>,
    engine: Option<PhysicsEngine>,
    opponent: Option<Box<dyn OpponentPolicy>>,
    config: Arc<GameConfig>,
    seed: u64,
    ticks: u64,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl MatchSession {
    /// Create a new session in `WaitingForPlayers`
    pub fn new(
        id: Uuid,
        mode: MatchMode,
        config: Arc<GameConfig>,
        seed: u64,
    ) -> (Self, MatchHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let opponent: Option<Box<dyn OpponentPolicy>> = match mode {
            MatchMode::SinglePlayer => {
                Some(Box::new(ReactiveAi::new(config.ai, seed ^ AI_SEED_SALT)))
            }
            MatchMode::Duel => None,
        };

        let handle = MatchHandle {
            id,
            mode,
            commands: commands_tx,
        };

        let session = Self {
            id,
            mode,
            phase: MatchPhase::WaitingForPlayers,
            players: Vec::with_capacity(mode.capacity()),
            engine: None,
            opponent,
            config,
            seed,
            ticks: 0,
            commands,
        };

        (session, handle)
    }

    /// Replace the computer opponent (single-player only)
    pub fn with_opponent(mut self, policy: Box<dyn OpponentPolicy>) -> Self {
        if self.mode.is_single_player() {
            self.opponent = Some(policy);
        }
        self
    }

    pub fn player_names(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.name.as_str()).collect()
    }

    /// Run the session until it is shut down or every handle is dropped
    pub async fn run(mut self) {
        debug!(match_id = %self.id, mode = ?self.mode, "Match session task started");

        let mut tick_interval = interval(self.config.tick_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else { break };

                    let was_running = self.phase == MatchPhase::Running;
                    if !self.handle_command(command) {
                        break;
                    }
                    if !was_running && self.phase == MatchPhase::Running {
                        // Initial state went out on start; next one is a full period away
                        tick_interval.reset();
                    }
                }

                _ = tick_interval.tick(), if self.phase == MatchPhase::Running => {
                    self.tick();
                }
            }
        }

        info!(match_id = %self.id, ticks = self.ticks, "Match session closed");
    }

    /// Apply one command; returns false when the task should exit
    fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::AddPlayer(player) => {
                let name = player.name.clone();
                if let Err(e) = self.add_player(player) {
                    warn!(match_id = %self.id, player = %name, error = %e, "Rejected player");
                }
            }
            SessionCommand::Start => {
                if let Err(e) = self.start() {
                    warn!(match_id = %self.id, error = %e, "Failed to start match");
                }
            }
            SessionCommand::Input {
                player_name,
                direction,
            } => {
                self.apply_input(&player_name, direction);
            }
            SessionCommand::RemovePlayer { player_name } => {
                self.remove_player(&player_name);
            }
            SessionCommand::End { winner, done } => {
                let ended = self.end(&winner);
                let _ = done.send(ended);
            }
            SessionCommand::Shutdown { done } => {
                self.phase = MatchPhase::Ended;
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    /// Append a player; rejected once every slot for the mode is taken
    pub fn add_player(&mut self, player: PlayerLink) -> Result<(), SessionError> {
        if self.players.len() >= self.mode.capacity() {
            return Err(SessionError::MatchFull);
        }
        if self.phase != MatchPhase::WaitingForPlayers {
            return Err(SessionError::InvalidTransition {
                action: "join",
                phase: self.phase,
            });
        }

        info!(
            match_id = %self.id,
            player = %player.name,
            player_count = self.players.len() + 1,
            "Player joined match"
        );
        self.players.push(player);
        Ok(())
    }

    /// Allocate the field, go to `Running` and send the initial state
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.phase != MatchPhase::WaitingForPlayers {
            return Err(SessionError::InvalidTransition {
                action: "start",
                phase: self.phase,
            });
        }
        let needed = self.mode.capacity();
        if self.players.len() < needed {
            return Err(SessionError::NotEnoughPlayers {
                needed,
                present: self.players.len(),
            });
        }

        let engine = PhysicsEngine::new(self.config.field, self.config.speed_profile, self.seed);
        let initial = game_state_msg(&engine, false, self.mode.is_single_player());
        self.engine = Some(engine);
        self.phase = MatchPhase::Running;

        info!(match_id = %self.id, players = ?self.player_names(), "Match started");
        self.broadcast(&initial);
        Ok(())
    }

    /// Move the sender's paddle; ignored unless running and the sender is known
    pub fn apply_input(&mut self, player_name: &str, direction: Move) {
        if self.phase != MatchPhase::Running {
            return;
        }
        let Some(side) = self.side_of(player_name) else {
            debug!(match_id = %self.id, player = %player_name, "Input from unknown player");
            return;
        };
        if let Some(engine) = self.engine.as_mut() {
            engine.move_paddle(side, direction);
        }
    }

    /// Drop a player's slot. A running match that loses a player ends at once.
    pub fn remove_player(&mut self, player_name: &str) -> bool {
        let Some(index) = self.players.iter().position(|p| p.name == player_name) else {
            return false;
        };
        self.players.remove(index);
        info!(match_id = %self.id, player = %player_name, "Player left match");

        if self.phase == MatchPhase::Running && self.players.len() < self.mode.capacity() {
            match self.players.first().map(|p| p.name.clone()) {
                Some(remaining) => {
                    self.end(&remaining);
                }
                None => {
                    self.phase = MatchPhase::Ended;
                    info!(match_id = %self.id, "Match abandoned");
                }
            }
        }
        true
    }

    /// Declare the winner and stop ticking. Only the first call has any effect.
    pub fn end(&mut self, winner: &str) -> bool {
        if self.phase == MatchPhase::Ended {
            return false;
        }
        self.phase = MatchPhase::Ended;

        if let Some(engine) = &self.engine {
            let last = game_state_msg(engine, true, self.mode.is_single_player());
            self.broadcast(&last);
        }
        self.broadcast(&ServerMsg::Winner {
            winner: winner.to_string(),
        });

        info!(match_id = %self.id, winner = %winner, ticks = self.ticks, "Match ended");
        true
    }

    /// Advance physics one step, broadcast, then check the win condition
    fn tick(&mut self) {
        debug_assert_eq!(
            self.phase,
            MatchPhase::Running,
            "tick on a session that is not running"
        );
        let single_player = self.mode.is_single_player();
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        self.ticks += 1;

        if let Some(opponent) = self.opponent.as_mut() {
            let view = PolicyView {
                side: Side::Right,
                ball: engine.ball(),
                paddle: engine.paddle(Side::Right),
                field: engine.field(),
            };
            if let Some(direction) = opponent.next_move(view, Instant::now()) {
                engine.move_paddle(Side::Right, direction);
            }
        }

        if let StepOutcome::Scored(side) = engine.step() {
            let score = engine.score();
            debug!(
                match_id = %self.id,
                scorer = ?side,
                left = score.left,
                right = score.right,
                "Point scored"
            );
        }

        let state = game_state_msg(engine, false, single_player);
        let score = engine.score();
        self.broadcast(&state);

        if let Some(side) = self.winning_side(score) {
            let winner = self.name_for(side);
            self.end(&winner);
        }
    }

    fn winning_side(&self, score: Score) -> Option<Side> {
        let target = self.config.win_score;
        if score.left >= target {
            Some(Side::Left)
        } else if score.right >= target {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// First joined plays left, second plays right
    fn side_of(&self, player_name: &str) -> Option<Side> {
        match self.players.iter().position(|p| p.name == player_name)? {
            0 => Some(Side::Left),
            1 => Some(Side::Right),
            _ => None,
        }
    }

    fn name_for(&self, side: Side) -> String {
        let index = match side {
            Side::Left => 0,
            Side::Right if self.mode.is_single_player() => return AI_PLAYER_NAME.to_string(),
            Side::Right => 1,
        };
        self.players
            .get(index)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("{:?}", side).to_lowercase())
    }

    /// Best-effort send to every player; a full or closed connection never blocks the tick
    fn broadcast(&self, msg: &ServerMsg) {
        for player in &self.players {
            match player.outbound.try_send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        match_id = %self.id,
                        player = %player.name,
                        "Outbound buffer full, dropping frame"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(match_id = %self.id, player = %player.name, "Player connection closed");
                }
            }
        }
    }
}

#[cfg(test)]
impl MatchSession {
    fn phase(&self) -> MatchPhase {
        self.phase
    }
}
