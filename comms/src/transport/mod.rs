/// Transport over WebSocket implementation for a client to be able to interact with the relay
#[cfg(feature = "client")]
pub mod client;
#[cfg(any(feature = "client", feature = "server"))]
mod common;
/// Transport over WebSocket implementation for the relay to interact with a single client stream
#[cfg(feature = "server")]
pub mod server;

/// Cheaply clonable UTF-8 frame payload, shared between every recipient of a broadcast
#[cfg(any(feature = "client", feature = "server"))]
pub use tokio_tungstenite::tungstenite::Utf8Bytes;
