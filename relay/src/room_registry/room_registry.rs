use std::collections::HashMap;

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::connection_id::ConnectionId;

use super::room::{Membership, RelayRoom, RoomFrame};

pub type RoomJoinResult = (broadcast::Receiver<RoomFrame>, Membership);

/// [RoomRegistry] owns every live room of the relay.
///
/// Rooms are created on their first `join` and removed as soon as their last member leaves,
/// so the registry never holds an empty room.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RelayRoom>>,
    room_buffer: usize,
}

impl RoomRegistry {
    /// `room_buffer` is the broadcast capacity of every room this registry creates.
    pub fn new(room_buffer: usize) -> Self {
        RoomRegistry {
            rooms: Mutex::new(HashMap::new()),
            room_buffer,
        }
    }

    /// Joins a connection to a room, creating the room if nobody is in it yet
    pub async fn join(&self, room_id: &str, connection_id: &ConnectionId) -> RoomJoinResult {
        let mut rooms = self.rooms.lock().await;

        let room = rooms.entry(String::from(room_id)).or_insert_with(|| {
            debug!(room_id, "room created");
            RelayRoom::new(room_id, self.room_buffer)
        });

        room.join(connection_id)
    }

    /// Takes the connection out of its room, dropping the room when it becomes empty.
    ///
    /// Returns true if the room was dropped.
    pub async fn leave(&self, membership: Membership) -> bool {
        let mut rooms = self.rooms.lock().await;
        let room_id = String::from(membership.room_id());

        let Some(room) = rooms.get_mut(&room_id) else {
            return false;
        };

        room.leave(membership);

        if room.is_empty() {
            rooms.remove(&room_id);
            debug!(%room_id, "room dropped");

            true
        } else {
            false
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Number of members in a room, zero for rooms which do not exist
    pub async fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .map(RelayRoom::len)
            .unwrap_or_default()
    }

    pub async fn is_member(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .is_some_and(|room| room.contains(connection_id))
    }
}

#[cfg(test)]
mod tests {
    use comms::transport::Utf8Bytes;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    fn frame(text: &str) -> Utf8Bytes {
        Utf8Bytes::from(String::from(text))
    }

    #[tokio::test]
    async fn test_first_join_creates_room() {
        let registry = RoomRegistry::new(8);
        let a = ConnectionId::generate();

        let (_rx, membership) = registry.join("lobby1", &a).await;

        assert_eq!(membership.room_id(), "lobby1");
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.member_count("lobby1").await, 1);
        assert!(registry.is_member("lobby1", &a).await);
    }

    #[tokio::test]
    async fn test_last_leave_drops_room() {
        let registry = RoomRegistry::new(8);
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        let (_a_rx, a_membership) = registry.join("lobby1", &a).await;
        let (_b_rx, b_membership) = registry.join("lobby1", &b).await;

        assert!(!registry.leave(a_membership).await);
        assert_eq!(registry.member_count("lobby1").await, 1);

        assert!(registry.leave(b_membership).await);
        assert_eq!(registry.room_count().await, 0);
        assert_eq!(registry.member_count("lobby1").await, 0);
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let registry = RoomRegistry::new(8);
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        let (_a_rx, a_membership) = registry.join("r1", &a).await;
        let (mut b_rx, _b_membership) = registry.join("r2", &b).await;

        assert_eq!(a_membership.broadcast(frame("hello")), 0);
        assert!(matches!(b_rx.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(registry.room_count().await, 2);
        assert_eq!(registry.member_count("r2").await, 1);
    }

    #[tokio::test]
    async fn test_recipient_count_follows_live_receivers() {
        let registry = RoomRegistry::new(8);
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        let (_a_rx, a_membership) = registry.join("lobby1", &a).await;
        let (b_rx, b_membership) = registry.join("lobby1", &b).await;

        // b left, but its receiver has not been released yet
        assert!(!registry.leave(b_membership).await);
        assert_eq!(registry.member_count("lobby1").await, 1);
        assert_eq!(a_membership.broadcast(frame("hello")), 1);

        drop(b_rx);
        assert_eq!(a_membership.broadcast(frame("hello")), 0);
    }

    #[tokio::test]
    async fn test_broadcast_shares_identical_bytes() {
        let registry = RoomRegistry::new(8);
        let sender = ConnectionId::generate();
        let (_sender_rx, membership) = registry.join("lobby1", &sender).await;

        let mut receivers = Vec::new();
        for _ in 0..99 {
            let (rx, membership) = registry.join("lobby1", &ConnectionId::generate()).await;
            receivers.push((rx, membership));
        }

        let recipients = membership.broadcast(frame(r#"{"type":"message","data":{"x":1}}"#));
        assert_eq!(recipients, 99);

        for (rx, _) in receivers.iter_mut() {
            let received = rx.try_recv().unwrap();
            assert_eq!(received.sender, sender);
            assert_eq!(
                received.payload.as_str(),
                r#"{"type":"message","data":{"x":1}}"#
            );
            assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    #[tokio::test]
    async fn test_leave_unknown_room_is_noop() {
        let registry = RoomRegistry::new(8);
        let other = RoomRegistry::new(8);
        let a = ConnectionId::generate();

        // a membership handed out by another registry is unknown here
        let (_rx, membership) = other.join("lobby1", &a).await;

        assert!(!registry.leave(membership).await);
        assert_eq!(registry.room_count().await, 0);
    }
}
