mod membership;
mod relay_room;

pub use self::membership::{Membership, RoomFrame};
pub use self::relay_room::RelayRoom;
