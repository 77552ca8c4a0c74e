use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use comms::transport::{self, server::Incoming};
use tokio::{net::TcpStream, sync::broadcast};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    config::RelayConfig, connection_id::ConnectionId, room_registry::RoomRegistry,
    stats::RelayStats,
};

use self::{heartbeat::Heartbeat, relay_session::RelaySession};

mod heartbeat;
mod relay_session;

/// How long a closing handshake may take before the socket is simply dropped
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Everything a connection needs from the relay, cloned into every session task
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Arc<RoomRegistry>,
    pub stats: Arc<RelayStats>,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub outbound_buffer: usize,
    pub handshake_timeout: Duration,
}

impl SessionContext {
    pub fn new(config: &RelayConfig, registry: Arc<RoomRegistry>, stats: Arc<RelayStats>) -> Self {
        SessionContext {
            registry,
            stats,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            outbound_buffer: config.outbound_buffer,
            handshake_timeout: config.handshake_timeout,
        }
    }
}

/// Why a connection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClosedByPeer,
    TransportError,
    HeartbeatTimeout,
    ServerShutdown,
}

/// Given an accepted tcp stream, upgrades it to a WebSocket and relays frames for it
/// until the peer closes, the socket fails, the peer stops answering pings, or the server shuts down
pub async fn handle_connection(
    ctx: SessionContext,
    mut quit_rx: broadcast::Receiver<()>,
    stream: TcpStream,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    // a socket which never upgrades must not outlive the deadline or a shutdown
    let handshake = tokio::time::timeout(ctx.handshake_timeout, transport::server::accept(stream));
    let (mut incoming, mut event_writer) = tokio::select! {
        accepted = handshake => accepted
            .with_context(|| format!("websocket handshake with {} timed out", peer))?
            .with_context(|| format!("websocket handshake with {} failed", peer))?,
        _ = quit_rx.recv() => {
            debug!(%peer, "server shut down before the websocket handshake completed");
            return Ok(());
        }
    };

    let connection_id = ConnectionId::generate();
    ctx.stats.record_connection_opened();
    info!(%connection_id, %peer, "connection opened");

    let mut session = RelaySession::new(
        connection_id.clone(),
        Arc::clone(&ctx.registry),
        Arc::clone(&ctx.stats),
        ctx.outbound_buffer,
    );
    let mut heartbeat = Heartbeat::new(ctx.heartbeat_interval, ctx.heartbeat_timeout);

    let reason = loop {
        let idle_deadline = heartbeat.deadline();

        tokio::select! {
            frame = incoming.next() => match frame {
                // stream ended without a close frame, treated the same as a clean close
                None | Some(Ok(Incoming::Close)) => break CloseReason::ClosedByPeer,
                Some(Ok(Incoming::Heartbeat)) => heartbeat.record_activity(),
                Some(Ok(Incoming::Command(cmd))) => {
                    heartbeat.record_activity();
                    ctx.stats.record_message_received();

                    match cmd {
                        Ok(cmd) => {
                            if let Err(e) = session.handle_command(cmd).await {
                                warn!(%connection_id, "failed to handle command: {:#}", e);
                            }
                        }
                        // a broken frame costs only itself, the connection stays open
                        Err(e) => {
                            ctx.stats.record_protocol_error();
                            warn!(%connection_id, "dropping frame: {}", e);
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!(%connection_id, "transport error: {}", e);
                    break CloseReason::TransportError;
                }
            },
            // frames of the current room are written to the peer
            Some(frame) = session.recv() => {
                if let Err(e) = event_writer.write_frame(frame).await {
                    debug!(%connection_id, "could not write to the socket: {}", e);
                    break CloseReason::TransportError;
                }
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                ctx.stats.record_heartbeat_timeout();
                warn!(%connection_id, "peer stopped responding to pings");
                break CloseReason::HeartbeatTimeout;
            }
            _ = heartbeat.tick() => {
                if let Err(e) = event_writer.ping().await {
                    debug!(%connection_id, "could not ping the peer: {}", e);
                    break CloseReason::TransportError;
                }
            }
            // the server is shutting down
            _ = quit_rx.recv() => break CloseReason::ServerShutdown,
        }
    };

    let room_id = session.current_room().map(String::from);
    session.close().await;

    // the peer is still there, let it know we are done with it
    if matches!(
        reason,
        CloseReason::HeartbeatTimeout | CloseReason::ServerShutdown
    ) {
        let _ = tokio::time::timeout(CLOSE_GRACE, event_writer.close()).await;
    }

    ctx.stats.record_connection_closed();
    info!(%connection_id, ?room_id, ?reason, "connection closed");

    Ok(())
}
