//! Match registry - pairs players into sessions and tracks live matches

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::{MatchHandle, MatchMode, MatchSession, PlayerLink, SessionError};
use crate::ws::protocol::ServerMsg;

/// Registry bookkeeping for one session
struct MatchEntry {
    handle: MatchHandle,
    /// Player names in join order
    players: Vec<String>,
    started: bool,
}

impl MatchEntry {
    fn is_open_duel(&self) -> bool {
        self.handle.mode == MatchMode::Duel
            && !self.started
            && self.players.len() < MatchMode::Duel.capacity()
    }
}

/// Sessions in creation order, plus the generator for per-match seeds
struct MatchTable {
    order: Vec<Uuid>,
    entries: HashMap<Uuid, MatchEntry>,
    seeds: ChaCha8Rng,
}

impl MatchTable {
    fn first_open_duel(&self) -> Option<Uuid> {
        self.order
            .iter()
            .copied()
            .find(|id| self.entries.get(id).is_some_and(MatchEntry::is_open_duel))
    }

    fn remove(&mut self, match_id: Uuid) -> Option<MatchEntry> {
        self.order.retain(|id| *id != match_id);
        self.entries.remove(&match_id)
    }
}

/// What happened to the session a player left
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The session had no players left and was deleted
    MatchClosed,
    /// The remaining player was declared winner.
    /// `ended` is false when the match had already finished.
    Forfeit { winner: String, ended: bool },
}

/// Holds every live session and routes players into them
pub struct MatchRegistry {
    config: Arc<GameConfig>,
    max_matches: usize,
    table: Mutex<MatchTable>,
}

impl MatchRegistry {
    pub fn new(config: GameConfig, max_matches: usize) -> Self {
        let seeds = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            config: Arc::new(config),
            max_matches,
            table: Mutex::new(MatchTable {
                order: Vec::new(),
                entries: HashMap::new(),
                seeds,
            }),
        }
    }

    /// Place a player in a session and return its id.
    ///
    /// Single-player requests always get a fresh session that starts at once.
    /// Duel requests fill the oldest waiting duel, or open a new one; the
    /// session starts as soon as its second player arrives. Must be called
    /// from within a Tokio runtime.
    pub fn join(
        &self,
        player_name: &str,
        is_single_player: bool,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> Result<Uuid, RegistryError> {
        let mode = MatchMode::from_flag(is_single_player);
        let mut table = self.table.lock();

        let (match_id, created) = match mode {
            MatchMode::Duel => match table.first_open_duel() {
                Some(id) => (id, false),
                None => (self.open_session(&mut table, mode)?, true),
            },
            MatchMode::SinglePlayer => (self.open_session(&mut table, mode)?, true),
        };

        let result = Self::seat_player(&mut table, match_id, player_name, outbound);
        if result.is_err() && created {
            table.remove(match_id);
        }
        let player_count = result?;

        info!(
            match_id = %match_id,
            player = %player_name,
            mode = ?mode,
            player_count,
            active_matches = table.entries.len(),
            "Player placed in match"
        );
        Ok(match_id)
    }

    /// Create and spawn a session; caller holds the table lock
    fn open_session(&self, table: &mut MatchTable, mode: MatchMode) -> Result<Uuid, RegistryError> {
        if table.entries.len() >= self.max_matches {
            warn!(max_matches = self.max_matches, "Match limit reached");
            return Err(RegistryError::Capacity {
                max: self.max_matches,
            });
        }

        let match_id = Uuid::new_v4();
        let seed = table.seeds.next_u64();
        let (session, handle) = MatchSession::new(match_id, mode, self.config.clone(), seed);
        tokio::spawn(session.run());

        table.order.push(match_id);
        table.entries.insert(
            match_id,
            MatchEntry {
                handle,
                players: Vec::with_capacity(mode.capacity()),
                started: false,
            },
        );

        info!(match_id = %match_id, mode = ?mode, "Created new match");
        Ok(match_id)
    }

    /// Commands go out under the table lock so sessions see joins in order
    fn seat_player(
        table: &mut MatchTable,
        match_id: Uuid,
        player_name: &str,
        outbound: mpsc::Sender<ServerMsg>,
    ) -> Result<usize, RegistryError> {
        let entry = table
            .entries
            .get_mut(&match_id)
            .ok_or(RegistryError::MatchNotFound(match_id))?;

        entry.handle.add_player(PlayerLink {
            name: player_name.to_string(),
            outbound,
        })?;
        entry.players.push(player_name.to_string());

        if entry.players.len() == entry.handle.mode.capacity() {
            entry.handle.start()?;
            entry.started = true;
        }
        Ok(entry.players.len())
    }

    /// Remove a player from their session.
    ///
    /// An emptied session is deleted and shut down. If one player remains they
    /// are declared winner. Returns once the session has applied the change.
    pub async fn leave(
        &self,
        match_id: Uuid,
        player_name: &str,
    ) -> Result<LeaveOutcome, RegistryError> {
        enum Pending {
            Shutdown(Result<oneshot::Receiver<()>, SessionError>),
            Forfeit(String, Result<oneshot::Receiver<bool>, SessionError>),
        }

        let pending = {
            let mut table = self.table.lock();
            let entry = table
                .entries
                .get_mut(&match_id)
                .ok_or(RegistryError::MatchNotFound(match_id))?;

            let position = entry
                .players
                .iter()
                .position(|p| p == player_name)
                .ok_or_else(|| RegistryError::PlayerNotFound {
                    match_id,
                    player: player_name.to_string(),
                })?;
            entry.players.remove(position);

            match entry.players.first().cloned() {
                Some(remaining) => {
                    // End before removal so the winner frame reaches the session's full roster
                    let end = entry.handle.request_end(&remaining);
                    let _ = entry.handle.remove_player(player_name);
                    Pending::Forfeit(remaining, end)
                }
                None => {
                    let handle = entry.handle.clone();
                    table.remove(match_id);
                    let _ = handle.remove_player(player_name);
                    Pending::Shutdown(handle.request_shutdown())
                }
            }
        };

        match pending {
            Pending::Shutdown(ack) => {
                if let Ok(ack) = ack {
                    if ack.await.is_err() {
                        debug!(match_id = %match_id, "Session exited before shutdown ack");
                    }
                }
                info!(match_id = %match_id, player = %player_name, "Match removed from registry");
                Ok(LeaveOutcome::MatchClosed)
            }
            Pending::Forfeit(winner, ack) => {
                let ended = ack?.await.map_err(|_| SessionError::Closed)?;
                info!(
                    match_id = %match_id,
                    player = %player_name,
                    winner = %winner,
                    ended,
                    "Player left, remaining player wins"
                );
                Ok(LeaveOutcome::Forfeit { winner, ended })
            }
        }
    }

    pub fn lookup(&self, match_id: Uuid) -> Option<MatchHandle> {
        self.table
            .lock()
            .entries
            .get(&match_id)
            .map(|entry| entry.handle.clone())
    }

    pub fn active_matches(&self) -> usize {
        self.table.lock().entries.len()
    }
}

#[cfg(test)]
impl MatchRegistry {
    /// Names currently seated in a match, in join order
    fn players(&self, match_id: Uuid) -> Option<Vec<String>> {
        self.table
            .lock()
            .entries
            .get(&match_id)
            .map(|entry| entry.players.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Match limit reached ({max})")]
    Capacity { max: usize },

    #[error("Match {0} not found")]
    MatchNotFound(Uuid),

    #[error("Player {player} is not in match {match_id}")]
    PlayerNotFound { match_id: Uuid, player: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn registry(max_matches: usize) -> MatchRegistry {
        MatchRegistry::new(
            GameConfig {
                seed: Some(5),
                ..GameConfig::default()
            },
            max_matches,
        )
    }

    fn outbound() -> (mpsc::Sender<ServerMsg>, mpsc::Receiver<ServerMsg>) {
        mpsc::channel(64)
    }

    async fn next_winner(rx: &mut mpsc::Receiver<ServerMsg>) -> String {
        while let Some(msg) = rx.recv().await {
            if let ServerMsg::Winner { winner } = msg {
                return winner;
            }
        }
        panic!("outbound closed without a winner");
    }

    #[tokio::test(start_paused = true)]
    async fn pairs_duel_players_in_join_order() {
        let registry = registry(10);
        let (a_tx, mut a_rx) = outbound();
        let (b_tx, mut b_rx) = outbound();
        let (c_tx, _c_rx) = outbound();

        let first = registry.join("alice", false, a_tx).unwrap();
        assert_eq!(registry.lookup(first).unwrap().mode, MatchMode::Duel);
        tokio::task::yield_now().await;
        assert!(a_rx.try_recv().is_err(), "state sent before the pair was complete");

        let second = registry.join("bob", false, b_tx).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.players(first).unwrap(), vec!["alice", "bob"]);

        // Both get the initial state once the pair is complete
        assert!(matches!(a_rx.recv().await, Some(ServerMsg::GameState { .. })));
        assert!(matches!(b_rx.recv().await, Some(ServerMsg::GameState { .. })));

        let third = registry.join("carol", false, c_tx).unwrap();
        assert_ne!(third, first);
        assert_eq!(registry.active_matches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_player_sessions_are_private() {
        let registry = registry(10);
        let (s_tx, mut s_rx) = outbound();

        let solo = registry.join("solo", true, s_tx).unwrap();
        let state = s_rx.recv().await.unwrap();
        match state {
            ServerMsg::GameState { game_state } => assert!(game_state.is_single_player),
            other => panic!("unexpected {other:?}"),
        }

        let (d_tx, _d_rx) = outbound();
        let duel = registry.join("dana", false, d_tx).unwrap();
        assert_ne!(solo, duel);

        let (e_tx, _e_rx) = outbound();
        let other_solo = registry.join("erin", true, e_tx).unwrap();
        assert_ne!(other_solo, solo);
        assert_ne!(other_solo, duel);
        assert_eq!(registry.players(solo).unwrap(), vec!["solo"]);
        assert_eq!(registry.active_matches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refuses_new_sessions_over_capacity() {
        let registry = registry(1);
        let (a_tx, _a_rx) = outbound();
        let (b_tx, _b_rx) = outbound();
        let (c_tx, _c_rx) = outbound();

        let id = registry.join("alice", false, a_tx).unwrap();
        assert!(matches!(
            registry.join("solo", true, c_tx),
            Err(RegistryError::Capacity { max: 1 })
        ));

        // Filling an existing duel needs no new session
        assert_eq!(registry.join("bob", false, b_tx).unwrap(), id);
        assert_eq!(registry.active_matches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_a_running_duel_forfeits() {
        let registry = registry(10);
        let (a_tx, _a_rx) = outbound();
        let (b_tx, mut b_rx) = outbound();
        let id = registry.join("alice", false, a_tx).unwrap();
        registry.join("bob", false, b_tx).unwrap();

        let outcome = registry.leave(id, "alice").await.unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome::Forfeit {
                winner: "bob".to_string(),
                ended: true
            }
        );
        assert_eq!(next_winner(&mut b_rx).await, "bob");
        assert_eq!(registry.players(id).unwrap(), vec!["bob"]);

        assert_eq!(registry.leave(id, "bob").await.unwrap(), LeaveOutcome::MatchClosed);
        assert!(registry.lookup(id).is_none());
        assert_eq!(registry.active_matches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_a_waiting_duel_deletes_it() {
        let registry = registry(10);
        let (a_tx, _a_rx) = outbound();
        let id = registry.join("alice", false, a_tx).unwrap();
        let handle = registry.lookup(id).unwrap();

        assert_eq!(registry.leave(id, "alice").await.unwrap(), LeaveOutcome::MatchClosed);
        assert_eq!(registry.active_matches(), 0);

        // Shutdown was acknowledged, so the session task is gone
        tokio::task::yield_now().await;
        assert_eq!(handle.start(), Err(SessionError::Closed));

        let (b_tx, _b_rx) = outbound();
        assert_ne!(registry.join("bob", false, b_tx).unwrap(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_reports_unknown_match_and_player() {
        let registry = registry(10);
        assert!(matches!(
            registry.leave(Uuid::new_v4(), "ghost").await,
            Err(RegistryError::MatchNotFound(_))
        ));

        let (a_tx, _a_rx) = outbound();
        let id = registry.join("alice", false, a_tx).unwrap();
        assert!(matches!(
            registry.leave(id, "ghost").await,
            Err(RegistryError::PlayerNotFound { .. })
        ));
        assert_eq!(registry.players(id).unwrap(), vec!["alice"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_form_complete_pairs() {
        let registry = Arc::new(registry(100));
        let mut tasks = Vec::new();

        for i in 0..20 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (tx, rx) = mpsc::channel(64);
                let id = registry.join(&format!("player-{i}"), false, tx).unwrap();
                (id, rx)
            }));
        }

        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for task in tasks {
            let (id, rx) = task.await.unwrap();
            ids.push(id);
            receivers.push(rx);
        }

        let distinct: HashSet<Uuid> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), 10);
        for id in distinct {
            assert_eq!(registry.players(id).unwrap().len(), 2);
            assert_eq!(ids.iter().filter(|x| **x == id).count(), 2);
        }
    }
}
