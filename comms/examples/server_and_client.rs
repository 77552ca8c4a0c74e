use anyhow::Context;
use comms::{
    command::ClientMessage,
    event::ServerMessage,
    transport::{self, server::Incoming},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;

const PORT: usize = 8081;

async fn server_example(listener: TcpListener) -> anyhow::Result<()> {
    // accept the only client connection we will have
    let tcp_stream = match listener.accept().await {
        Ok((tcp_stream, _addr)) => tcp_stream,
        Err(e) => return Err(anyhow::anyhow!("failed to accept client: {}", e)),
    };

    // upgrade the client connection and break it into higher level API for ease of use
    let (mut incoming, mut event_writer) = transport::server::accept(tcp_stream).await?;

    event_writer
        .write(&ServerMessage::message(&json!({"greeting": "hello from the server"}))?)
        .await?;

    // listen for frames from the client until the connection is closed
    while let Some(result) = incoming.next().await {
        match result {
            // client has sent a valid command which we could read and parse
            Ok(Incoming::Command(Ok(command))) => println!("SERVER: received command: {:?}", command),
            // client has sent a frame which we could not parse
            // could be a bug in the client, malicious client, breaking api changes etc.
            Ok(Incoming::Command(Err(e))) => println!("SERVER: failed to parse command: {}", e),
            Ok(Incoming::Heartbeat) => println!("SERVER: received control frame"),
            Ok(Incoming::Close) => break,
            Err(e) => println!("SERVER: failed to read frame: {}", e),
        }
    }

    Ok(())
}

async fn client_example() -> anyhow::Result<()> {
    // create a client connection to the server
    let (mut event_stream, mut command_writer) =
        transport::client::connect(&format!("ws://localhost:{}", PORT)).await?;

    // read the greeting from the server
    match event_stream.next().await {
        Some(Ok(event)) => println!("CLIENT: received event: {:?}", event),
        Some(Err(e)) => println!("CLIENT: failed to read event: {}", e),
        None => return Err(anyhow::anyhow!("server closed the connection")),
    }

    // send some commands to the server
    command_writer.write(&ClientMessage::init("room-1")).await?;
    command_writer
        .write(&ClientMessage::message(&json!({"content": "content-1"}))?)
        .await?;
    command_writer.close().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // bind before connecting so the client never races the listener
    let listener = TcpListener::bind(format!("0.0.0.0:{}", PORT))
        .await
        .context("could not bind to the port")?;

    tokio::try_join!(server_example(listener), client_example())
        .context("one of the examples failed")?;

    println!("example ran without problems");

    Ok(())
}
