//! WebSocket gateway: wire protocol and per-connection handling

pub mod connections;
pub mod error;
pub mod handler;
pub mod protocol;

pub use connections::ConnectedPlayers;
