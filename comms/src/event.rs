use serde::{de, Deserialize, Deserializer, Serialize};

use crate::payload::{payload_text, to_payload, Payload};

/// Another member of the room has sent a message
#[derive(Debug, Clone, Serialize)]
pub struct RelayedMessageEvent {
    /// The data exactly as the sender provided it
    pub data: Payload,
}

impl PartialEq for RelayedMessageEvent {
    fn eq(&self, other: &Self) -> bool {
        payload_text(&self.data) == payload_text(&other.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Events that can be sent to the client
/// The relay only ever fans out messages of other members, it never replies to a command
pub enum ServerMessage {
    Message(RelayedMessageEvent),
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    data: Payload,
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = WireEvent::deserialize(deserializer)?;

        match wire.kind.as_str() {
            "message" => Ok(ServerMessage::Message(RelayedMessageEvent { data: wire.data })),
            other => Err(de::Error::unknown_variant(other, &["message"])),
        }
    }
}

impl ServerMessage {
    pub fn message<T: Serialize + ?Sized>(data: &T) -> serde_json::Result<Self> {
        Ok(ServerMessage::relay(to_payload(data)?))
    }

    /// Wraps data received from another member without touching it
    pub fn relay(data: Payload) -> Self {
        ServerMessage::Message(RelayedMessageEvent { data })
    }
}
