//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::MatchRegistry;
use crate::ws::ConnectedPlayers;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<MatchRegistry>,
    pub connections: Arc<ConnectedPlayers>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        // One registry per process, handed to every connection
        let registry = Arc::new(MatchRegistry::new(config.game.clone(), config.max_matches));

        Self {
            config: Arc::new(config),
            registry,
            connections: Arc::new(ConnectedPlayers::new()),
        }
    }
}
