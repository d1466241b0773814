//! Matchmaking: placing players into match sessions

pub mod registry;

pub use registry::{MatchRegistry, RegistryError};
