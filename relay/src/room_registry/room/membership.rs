use comms::transport::Utf8Bytes;
use tokio::sync::broadcast;

use crate::connection_id::ConnectionId;

/// A serialized frame fanned out to every member of a room, tagged with its sender
/// so the sender's own forwarder can skip it.
#[derive(Debug, Clone)]
pub struct RoomFrame {
    pub sender: ConnectionId,
    pub payload: Utf8Bytes,
}

#[derive(Debug)]
/// [Membership] is a handle that allows a specific connection to
/// broadcast frames to a specific room.
///
/// It is created when a connection joins a room and handed back to the registry when it leaves.
pub struct Membership {
    /// The room which is associated with this handle
    room_id: String,
    /// The connection which owns this handle
    connection_id: ConnectionId,
    /// The channel to use for fanning frames out to all members of the room
    broadcast_tx: broadcast::Sender<RoomFrame>,
}

impl Membership {
    pub(super) fn new(
        room_id: String,
        connection_id: ConnectionId,
        broadcast_tx: broadcast::Sender<RoomFrame>,
    ) -> Self {
        Membership {
            room_id,
            connection_id,
            broadcast_tx,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Fan a frame out to the room.
    ///
    /// Every recipient shares the same payload bytes. Returns how many other receivers
    /// were subscribed when the frame was sent. This is an upper bound on deliveries:
    /// a receiver whose forwarder was aborted but not yet dropped is still counted,
    /// and a lagging receiver may skip the frame.
    pub fn broadcast(&self, payload: Utf8Bytes) -> usize {
        let frame = RoomFrame {
            sender: self.connection_id.clone(),
            payload,
        };

        match self.broadcast_tx.send(frame) {
            // the sender's own receiver is part of the count
            Ok(receivers) => receivers.saturating_sub(1),
            Err(_) => 0,
        }
    }
}
