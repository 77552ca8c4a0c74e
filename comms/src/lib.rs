/// Set of commands which the relay can receive from a connection
pub mod command;
/// Protocol and transport errors shared by clients and the relay
pub mod error;
/// Set of events the relay sends to a connection
pub mod event;
/// Opaque JSON carried by messages
pub mod payload;
/// Implementation of event and command transportation over WebSocket streams.
/// Requires 'server' or 'client' features to be enabled and will bring in tokio dependency alongside with other dependencies
pub mod transport;
