use serde_json::error::Category;
use thiserror::Error;

/// A single inbound payload could not be understood.
///
/// Never fatal for the connection which sent it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not valid json: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("payload is not a recognized message: {0}")]
    Unrecognized(#[source] serde_json::Error),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => ProtocolError::Unrecognized(err),
            Category::Io | Category::Syntax | Category::Eof => ProtocolError::Malformed(err),
        }
    }
}

/// The underlying socket failed, or an outbound message could not be encoded.
#[cfg(any(feature = "client", feature = "server"))]
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("could not serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}
