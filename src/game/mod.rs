//! Game simulation modules

pub mod ai;
pub mod r#match;
pub mod physics;
pub mod snapshot;

pub use r#match::{MatchHandle, MatchMode, MatchSession, PlayerLink, SessionError};
