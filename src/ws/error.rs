//! Reasons a match connection gets closed by the server

use crate::matchmaking::RegistryError;

use super::protocol::{CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION};

/// Connection failures; the display text is the close reason sent to the client
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Player name is required")]
    MissingName,

    #[error("Player already connected")]
    DuplicateName,

    #[error("Failed to create or join match")]
    JoinFailed(#[source] RegistryError),

    #[error("Invalid move")]
    InvalidMove,

    #[error("Match not found")]
    MatchNotFound,

    /// Transport failure; the underlying error is kept for logs only
    #[error("Socket error")]
    Socket(String),
}

impl GatewayError {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::MissingName | Self::DuplicateName | Self::InvalidMove => CLOSE_POLICY_VIOLATION,
            Self::JoinFailed(_) | Self::MatchNotFound | Self::Socket(_) => CLOSE_INTERNAL_ERROR,
        }
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }
}
