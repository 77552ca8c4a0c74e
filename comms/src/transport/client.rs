use anyhow::Context;
use futures_util::{future, stream::SplitSink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{command::ClientMessage, event::ServerMessage};

use super::common::BoxedStream;

type ClientSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// [EventStream] is a stream of [crate::event::ServerMessage]s sent by the relay
///
/// Control frames are answered by the underlying socket and never surface here.
/// Answering pings requires the stream to be polled.
///
/// # Cancel Safety
///
/// This stream is cancel-safe, meaning that it can be used in [tokio::select]
/// without the risk of missing events.
pub type EventStream = BoxedStream<anyhow::Result<ServerMessage>>;

/// [CommandWriter] is a wrapper around the write half of a WebSocket which writes [crate::command::ClientMessage]s to the relay
pub struct CommandWriter {
    sink: ClientSink,
}

impl CommandWriter {
    pub fn new(sink: ClientSink) -> Self {
        Self { sink }
    }

    /// Send a [crate::command::ClientMessage] as a single text frame
    ///
    /// # Cancel Safety
    ///
    /// This method is not cancellation safe. If it is used as the event
    /// in a [tokio::select!] statement and some other
    /// branch completes first, then the provided [crate::command::ClientMessage] may or may not
    /// have been written to the socket.
    pub async fn write(&mut self, command: &ClientMessage) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(command)?;

        self.write_raw(serialized).await
    }

    /// Send an arbitrary text frame, whether or not it is a valid command
    pub async fn write_raw(&mut self, text: impl Into<String>) -> anyhow::Result<()> {
        let text: String = text.into();

        self.sink
            .send(Message::Text(text.into()))
            .await
            .context("could not write frame to the relay")?;

        Ok(())
    }

    /// Start the closing handshake
    pub async fn close(&mut self) -> anyhow::Result<()> {
        self.sink
            .close()
            .await
            .context("could not close the connection to the relay")?;

        Ok(())
    }
}

/// Connects to the relay and splits the socket into a stream of events and a command writer.
///
/// # Arguments
///
/// - `url` - WebSocket url of the relay, e.g. `ws://localhost:8080`
pub async fn connect(url: &str) -> anyhow::Result<(EventStream, CommandWriter)> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("could not connect to the relay at {}", url))?;

    Ok(split_ws_stream(ws_stream))
}

/// Splits a WebSocket stream into a stream of events and a command writer.
pub fn split_ws_stream(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> (EventStream, CommandWriter) {
    let (sink, source) = ws_stream.split();

    (
        Box::pin(source.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(
                    serde_json::from_str::<ServerMessage>(text.as_str())
                        .context("failed to deserialize event from the relay"),
                ),
                Ok(Message::Binary(bytes)) => Some(
                    serde_json::from_slice::<ServerMessage>(&bytes)
                        .context("failed to deserialize event from the relay"),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(e).context("could not read frame from the relay")),
            })
        })),
        CommandWriter::new(sink),
    )
}
