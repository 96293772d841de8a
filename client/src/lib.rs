//! Client side of the pyramids relay: one WebSocket connection that sends
//! local pose samples and republishes what other players do.

pub mod config;
pub mod connection;
pub mod error;
pub mod roster;

pub use config::{ClientConfig, ReconnectPolicy};
pub use connection::{ConnectionState, ConnectionStatus, NetEvent, RelayClient};
pub use error::ClientError;
pub use roster::PlayerRoster;
