pub use self::room::{Membership, RoomFrame};
pub use self::room_registry::{RoomJoinResult, RoomRegistry};

mod room;
#[allow(clippy::module_inception)]
mod room_registry;
