use std::collections::HashSet;

use tokio::sync::broadcast;

use crate::connection_id::ConnectionId;

use super::membership::{Membership, RoomFrame};

#[derive(Debug)]
/// [RelayRoom] tracks the members of a room and owns its broadcast channel.
/// A [Membership] is handed out to a connection when it joins the room.
pub struct RelayRoom {
    id: String,
    broadcast_tx: broadcast::Sender<RoomFrame>,
    members: HashSet<ConnectionId>,
}

impl RelayRoom {
    /// `capacity` is how many frames a lagging member may fall behind before it skips the oldest.
    pub fn new(id: &str, capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));

        RelayRoom {
            id: String::from(id),
            broadcast_tx,
            members: HashSet::new(),
        }
    }

    /// Add a member to the room
    ///
    /// # Returns
    ///
    /// - A broadcast receiver for the connection to receive frames from the room
    /// - A [Membership] for the connection to be able to broadcast to the room
    pub fn join(
        &mut self,
        connection_id: &ConnectionId,
    ) -> (broadcast::Receiver<RoomFrame>, Membership) {
        let broadcast_rx = self.broadcast_tx.subscribe();
        let membership = Membership::new(
            self.id.clone(),
            connection_id.clone(),
            self.broadcast_tx.clone(),
        );

        self.members.insert(connection_id.clone());

        (broadcast_rx, membership)
    }

    /// Remove a member from the room, consuming its [Membership].
    /// Returns false if the connection was not a member.
    pub fn leave(&mut self, membership: Membership) -> bool {
        self.members.remove(membership.connection_id())
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains(connection_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use comms::transport::Utf8Bytes;

    use super::*;

    #[test]
    fn test_join_and_leave() {
        let mut room = RelayRoom::new("lobby1", 8);
        let a = ConnectionId::generate();

        let (_rx, membership) = room.join(&a);
        assert!(room.contains(&a));
        assert_eq!(room.len(), 1);
        assert_eq!(membership.room_id(), "lobby1");

        assert!(room.leave(membership));
        assert!(room.is_empty());
    }

    #[test]
    fn test_broadcast_is_tagged_with_sender() {
        let mut room = RelayRoom::new("lobby1", 8);
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        let (_a_rx, a_membership) = room.join(&a);
        let (mut b_rx, _b_membership) = room.join(&b);

        let recipients = a_membership.broadcast(Utf8Bytes::from(String::from("hello")));
        assert_eq!(recipients, 1);

        let frame = b_rx.try_recv().unwrap();
        assert_eq!(frame.sender, a);
        assert_eq!(frame.payload.as_str(), "hello");
    }

    #[test]
    fn test_lagging_member_skips_oldest() {
        let mut room = RelayRoom::new("lobby1", 2);
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        let (_a_rx, a_membership) = room.join(&a);
        let (mut b_rx, _b_membership) = room.join(&b);

        for i in 0..3 {
            a_membership.broadcast(Utf8Bytes::from(i.to_string()));
        }

        assert!(matches!(
            b_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert_eq!(b_rx.try_recv().unwrap().payload.as_str(), "1");
        assert_eq!(b_rx.try_recv().unwrap().payload.as_str(), "2");
    }
}
