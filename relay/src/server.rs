use std::{future::Future, sync::Arc};

use anyhow::Context;
use tokio::{net::TcpListener, sync::broadcast, task::JoinSet};
use tracing::{debug, info, warn};

use crate::{
    config::RelayConfig,
    room_registry::RoomRegistry,
    session::{self, SessionContext},
    stats::RelayStats,
};

/// [RelayServer] accepts WebSocket connections and runs one session task per connection.
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<RoomRegistry>,
    stats: Arc<RelayStats>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(config.room_buffer));

        RelayServer {
            config,
            registry,
            stats: Arc::new(RelayStats::new()),
        }
    }

    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Binds the listener on the configured host and port
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = self.config.bind_addr();

        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("could not bind to {}", addr))
    }

    /// Accepts connections on `listener` until `shutdown` resolves,
    /// then asks every session to close and waits for them to finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let ctx = SessionContext::new(&self.config, self.registry(), self.stats());
        let mut join_set: JoinSet<anyhow::Result<()>> = JoinSet::new();
        let (quit_tx, quit_rx) = broadcast::channel::<()>(1);

        tokio::pin!(shutdown);

        info!(addr = %listener.local_addr()?, "relay listening");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("relay interrupted, gracefully shutting down");
                    // no session may be listening yet, which is fine
                    let _ = quit_tx.send(());
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        join_set.spawn(session::handle_connection(ctx.clone(), quit_rx.resubscribe(), stream, peer));
                    }
                    Err(e) => warn!("failed to accept connection: {}", e),
                },
                // reap finished sessions so the set only holds live connections
                Some(result) = join_set.join_next() => log_session_result(result),
            }
        }

        drop(listener);
        while let Some(result) = join_set.join_next().await {
            log_session_result(result);
        }

        let snapshot = self.stats.snapshot();
        let rooms = self.registry.room_count().await;
        info!(
            stats = %serde_json::to_string(&snapshot).unwrap_or_default(),
            active_connections = self.stats.active_connections(),
            rooms = rooms,
            "relay shut down"
        );

        Ok(())
    }
}

fn log_session_result(result: Result<anyhow::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("session ended with an error: {:#}", e),
        Err(e) => warn!("session task failed: {}", e),
    }
}
