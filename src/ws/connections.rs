//! Process-wide set of connected player names

use std::sync::Arc;

use dashmap::DashSet;

/// Names of players with an open match connection
#[derive(Debug, Default)]
pub struct ConnectedPlayers {
    names: DashSet<String>,
}

impl ConnectedPlayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name for one connection. `None` if the name is taken.
    /// The name is released when the returned claim is dropped.
    pub fn claim(self: &Arc<Self>, name: &str) -> Option<NameClaim> {
        if !self.names.insert(name.to_string()) {
            return None;
        }
        Some(NameClaim {
            players: Arc::clone(self),
            name: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_connected(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Exclusive hold on a player name for the lifetime of a connection
#[derive(Debug)]
pub struct NameClaim {
    players: Arc<ConnectedPlayers>,
    name: String,
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        self.players.names.remove(&self.name);
    }
}
