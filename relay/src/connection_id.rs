use std::{fmt, sync::Arc};

use nanoid::nanoid;

/// Process-unique identifier of a single connection, generated when the socket is accepted.
///
/// Cheap to clone, since every frame fanned out to a room carries the id of its sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    pub fn generate() -> Self {
        ConnectionId(Arc::from(nanoid!()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_string(), a.as_str());
    }
}
