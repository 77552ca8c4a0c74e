//! Room relay: a WebSocket service which groups connections into named rooms
//! and fans every message out to the other members of the sender's room.

pub mod config;
pub mod connection_id;
pub mod room_registry;
pub mod server;
pub mod session;
pub mod stats;

pub use config::{ConfigError, RelayConfig};
pub use room_registry::RoomRegistry;
pub use server::RelayServer;
pub use stats::RelayStats;
