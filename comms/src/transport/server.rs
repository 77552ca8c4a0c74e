use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{Message, Utf8Bytes},
    WebSocketStream,
};

use crate::{
    command::ClientMessage,
    error::{ProtocolError, TransportError},
    event::ServerMessage,
};

use super::common::BoxedStream;

/// A single frame read from the client, reduced to what the relay cares about
#[derive(Debug)]
pub enum Incoming {
    /// A data frame, parsed into a command or the reason it could not be
    Command(Result<ClientMessage, ProtocolError>),
    /// A control frame; only proves the peer is still alive
    Heartbeat,
    /// The client asked to close the connection
    Close,
}

/// [IncomingStream] is a stream of [Incoming] frames sent by the client
///
/// # Cancel Safety
///
/// This stream is cancel-safe, meaning that it can be used in [tokio::select!]
/// without the risk of missing frames.
pub type IncomingStream = BoxedStream<Result<Incoming, TransportError>>;

/// [EventWriter] is a wrapper around the write half of a [WebSocketStream] which writes frames to the client
pub struct EventWriter {
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
}

impl EventWriter {
    pub fn new(sink: SplitSink<WebSocketStream<TcpStream>, Message>) -> Self {
        Self { sink }
    }

    /// Serialize and send a [crate::event::ServerMessage]
    pub async fn write(&mut self, event: &ServerMessage) -> Result<(), TransportError> {
        let serialized = serde_json::to_string(event)?;

        self.write_frame(serialized.into()).await
    }

    /// Send an already serialized text frame
    ///
    /// # Cancel Safety
    ///
    /// This method is not cancellation safe. If it is used as the event
    /// in a [tokio::select!] statement and some other
    /// branch completes first, the frame may or may not have been queued on the socket.
    pub async fn write_frame(&mut self, frame: Utf8Bytes) -> Result<(), TransportError> {
        self.sink.send(Message::Text(frame)).await?;

        Ok(())
    }

    /// Send an empty ping, the client is expected to answer with a pong
    pub async fn ping(&mut self) -> Result<(), TransportError> {
        self.sink.send(Message::Ping(Vec::new().into())).await?;

        Ok(())
    }

    /// Start the closing handshake and flush it to the socket
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await?;

        Ok(())
    }
}

/// Performs the WebSocket upgrade handshake on an accepted TCP stream,
/// then splits it into a stream of incoming frames and an event writer.
pub async fn accept(stream: TcpStream) -> Result<(IncomingStream, EventWriter), TransportError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;

    Ok(split_ws_stream(ws_stream))
}

/// Splits a WebSocket stream into a stream of incoming frames and an event writer.
///
/// # Arguments
///
/// - `ws_stream` - An upgraded [WebSocketStream] to split
pub fn split_ws_stream(ws_stream: WebSocketStream<TcpStream>) -> (IncomingStream, EventWriter) {
    let (sink, source) = ws_stream.split();

    (
        Box::pin(source.map(|frame| -> Result<Incoming, TransportError> {
            Ok(match frame? {
                Message::Text(text) => Incoming::Command(ClientMessage::parse(text.as_bytes())),
                Message::Binary(bytes) => Incoming::Command(ClientMessage::parse(&bytes)),
                Message::Close(_) => Incoming::Close,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Incoming::Heartbeat,
            })
        })),
        EventWriter::new(sink),
    )
}
