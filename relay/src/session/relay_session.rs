use std::sync::Arc;

use anyhow::Context;
use comms::{
    command::{ClientMessage, InitCommand, MessageCommand},
    event::ServerMessage,
    payload::Payload,
    transport::Utf8Bytes,
};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::{AbortHandle, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    connection_id::ConnectionId,
    room_registry::{Membership, RoomFrame, RoomRegistry},
    stats::RelayStats,
};

/// A frame forwarded from a room, stamped with the join it belongs to
struct ForwardedFrame {
    epoch: u64,
    payload: Utf8Bytes,
}

struct JoinedRoom {
    membership: Membership,
    forwarder: AbortHandle,
}

/// Lifecycle of a connection: `Unjoined -> Joined(room) -> Closed`
enum SessionState {
    Unjoined,
    Joined(JoinedRoom),
    Closed,
}

/// [RelaySession] holds the room participation of a single connection.
///
/// Frames of the current room are funneled into one channel, so the connection
/// loop only has to select on [RelaySession::recv].
pub(super) struct RelaySession {
    connection_id: ConnectionId,
    registry: Arc<RoomRegistry>,
    stats: Arc<RelayStats>,
    state: SessionState,
    // bumped on every join, frames of an earlier join are discarded
    epoch: u64,
    join_set: JoinSet<()>,
    mpsc_tx: mpsc::Sender<ForwardedFrame>,
    mpsc_rx: mpsc::Receiver<ForwardedFrame>,
}

impl RelaySession {
    pub fn new(
        connection_id: ConnectionId,
        registry: Arc<RoomRegistry>,
        stats: Arc<RelayStats>,
        outbound_buffer: usize,
    ) -> Self {
        let (mpsc_tx, mpsc_rx) = mpsc::channel(outbound_buffer.max(1));

        RelaySession {
            connection_id,
            registry,
            stats,
            state: SessionState::Unjoined,
            epoch: 0,
            join_set: JoinSet::new(),
            mpsc_tx,
            mpsc_rx,
        }
    }

    /// The room this connection currently occupies
    pub fn current_room(&self) -> Option<&str> {
        match &self.state {
            SessionState::Joined(joined) => Some(joined.membership.room_id()),
            SessionState::Unjoined | SessionState::Closed => None,
        }
    }

    /// Handle a single command sent by the connection
    pub async fn handle_command(&mut self, cmd: ClientMessage) -> anyhow::Result<()> {
        match cmd {
            ClientMessage::Init(InitCommand { room_id }) => self.join(room_id).await,
            ClientMessage::Message(MessageCommand { data }) => self.broadcast(data),
        }
    }

    /// Move the connection into `room_id`, leaving its current room first
    async fn join(&mut self, room_id: String) -> anyhow::Result<()> {
        match &self.state {
            SessionState::Closed => return Ok(()),
            SessionState::Joined(joined) if joined.membership.room_id() == room_id => {
                debug!(connection_id = %self.connection_id, %room_id, "already in room");
                return Ok(());
            }
            SessionState::Unjoined | SessionState::Joined(_) => {}
        }

        self.leave_current_room().await;

        let (broadcast_rx, membership) = self.registry.join(&room_id, &self.connection_id).await;

        self.epoch += 1;

        // spawn a task to forward the room's frames into this connection's channel,
        // skipping the frames this connection sent itself
        let forwarder = self.join_set.spawn(forward_room_frames(
            broadcast_rx,
            self.connection_id.clone(),
            self.epoch,
            self.mpsc_tx.clone(),
        ));

        info!(connection_id = %self.connection_id, %room_id, "joined room");

        self.state = SessionState::Joined(JoinedRoom {
            membership,
            forwarder,
        });

        Ok(())
    }

    /// Relay data to every other member of the current room
    fn broadcast(&self, data: Payload) -> anyhow::Result<()> {
        let SessionState::Joined(joined) = &self.state else {
            debug!(connection_id = %self.connection_id, "dropping message sent outside of a room");
            return Ok(());
        };

        // serialized once, every recipient gets the same bytes
        let frame = serde_json::to_string(&ServerMessage::relay(data))
            .context("could not serialize relayed message")?;
        let recipients = joined.membership.broadcast(Utf8Bytes::from(frame));

        self.stats.record_messages_relayed(recipients);
        debug!(
            connection_id = %self.connection_id,
            room_id = joined.membership.room_id(),
            recipients,
            "relayed message"
        );

        Ok(())
    }

    /// Leave the current room, if any, and stop forwarding its frames
    async fn leave_current_room(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Unjoined);

        if let SessionState::Joined(JoinedRoom {
            membership,
            forwarder,
        }) = state
        {
            forwarder.abort();
            // reap forwarders of earlier rooms which already finished
            while self.join_set.try_join_next().is_some() {}

            let room_id = String::from(membership.room_id());
            let dropped = self.registry.leave(membership).await;

            info!(connection_id = %self.connection_id, %room_id, room_dropped = dropped, "left room");
        }
    }

    /// Leave the current room for good, no further command has any effect
    pub async fn close(&mut self) {
        self.leave_current_room().await;
        self.join_set.abort_all();
        self.state = SessionState::Closed;
    }

    /// Receive the next frame of the current room
    ///
    /// # Cancel Safety
    ///
    /// This method is cancel-safe, no frame is lost if it is used in [tokio::select!].
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        loop {
            let frame = self.mpsc_rx.recv().await?;

            if frame.epoch == self.epoch && matches!(self.state, SessionState::Joined(_)) {
                return Some(frame.payload);
            }
        }
    }
}

/// Forwards frames of a room to a connection until the connection leaves or the room goes away
async fn forward_room_frames(
    mut broadcast_rx: broadcast::Receiver<RoomFrame>,
    connection_id: ConnectionId,
    epoch: u64,
    mpsc_tx: mpsc::Sender<ForwardedFrame>,
) {
    loop {
        match broadcast_rx.recv().await {
            Ok(frame) if frame.sender == connection_id => continue,
            Ok(frame) => {
                let forwarded = ForwardedFrame {
                    epoch,
                    payload: frame.payload,
                };

                if mpsc_tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(%connection_id, skipped, "connection fell behind its room, frames skipped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn new_session(registry: &Arc<RoomRegistry>) -> RelaySession {
        RelaySession::new(
            ConnectionId::generate(),
            Arc::clone(registry),
            Arc::new(RelayStats::new()),
            16,
        )
    }

    async fn recv_now(session: &mut RelaySession) -> Option<Utf8Bytes> {
        tokio::time::timeout(Duration::from_millis(100), session.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_message_reaches_others_but_not_sender() {
        let registry = Arc::new(RoomRegistry::new(16));
        let mut a = new_session(&registry);
        let mut b = new_session(&registry);

        a.handle_command(ClientMessage::init("lobby1")).await.unwrap();
        b.handle_command(ClientMessage::init("lobby1")).await.unwrap();
        a.handle_command(ClientMessage::message(&json!({"x": 1})).unwrap())
            .await
            .unwrap();

        let received = recv_now(&mut b).await.unwrap();
        assert_eq!(received.as_str(), r#"{"type":"message","data":{"x":1}}"#);
        assert!(recv_now(&mut b).await.is_none());
        assert!(recv_now(&mut a).await.is_none());
        assert_eq!(a.stats.snapshot().messages_relayed, 1);
    }

    #[tokio::test]
    async fn test_message_before_init_is_dropped() {
        let registry = Arc::new(RoomRegistry::new(16));
        let mut a = new_session(&registry);

        a.handle_command(ClientMessage::message(&json!("hello")).unwrap())
            .await
            .unwrap();

        assert_eq!(a.current_room(), None);
        assert_eq!(a.stats.snapshot().messages_relayed, 0);
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_second_init_leaves_previous_room() {
        let registry = Arc::new(RoomRegistry::new(16));
        let mut a = new_session(&registry);
        let mut c = new_session(&registry);

        a.handle_command(ClientMessage::init("r1")).await.unwrap();
        c.handle_command(ClientMessage::init("r1")).await.unwrap();
        a.handle_command(ClientMessage::init("r2")).await.unwrap();

        assert_eq!(a.current_room(), Some("r2"));
        assert!(!registry.is_member("r1", &a.connection_id).await);
        assert_eq!(registry.member_count("r1").await, 1);
        assert_eq!(registry.member_count("r2").await, 1);

        c.handle_command(ClientMessage::message(&json!("still here?")).unwrap())
            .await
            .unwrap();

        assert!(recv_now(&mut a).await.is_none());
    }

    #[tokio::test]
    async fn test_reinit_same_room_is_noop() {
        let registry = Arc::new(RoomRegistry::new(16));
        let mut a = new_session(&registry);

        a.handle_command(ClientMessage::init("lobby1")).await.unwrap();
        let epoch = a.epoch;
        a.handle_command(ClientMessage::init("lobby1")).await.unwrap();

        assert_eq!(a.epoch, epoch);
        assert_eq!(registry.member_count("lobby1").await, 1);
    }

    #[tokio::test]
    async fn test_close_leaves_and_drops_empty_room() {
        let registry = Arc::new(RoomRegistry::new(16));
        let mut a = new_session(&registry);

        a.handle_command(ClientMessage::init("lobby1")).await.unwrap();
        a.close().await;

        assert_eq!(a.current_room(), None);
        assert_eq!(registry.room_count().await, 0);

        // commands after close have no effect
        a.handle_command(ClientMessage::init("lobby1")).await.unwrap();
        assert_eq!(registry.room_count().await, 0);
    }
}
