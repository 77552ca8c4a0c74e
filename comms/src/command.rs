use serde::{de, Deserialize, Deserializer, Serialize};

use crate::{
    error::ProtocolError,
    payload::{payload_text, to_payload, Payload},
};

/// Connection command for joining a room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitCommand {
    // The room to join, created on first reference.
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Connection command for sending a message to the other members of the current room.
#[derive(Debug, Clone, Serialize)]
pub struct MessageCommand {
    // Forwarded byte for byte. A missing field is relayed as null.
    pub data: Payload,
}

impl PartialEq for MessageCommand {
    fn eq(&self, other: &Self) -> bool {
        payload_text(&self.data) == payload_text(&other.data)
    }
}

/// A command which can be sent to the relay by a single connection.
/// All commands are processed in the context of the room the connection currently occupies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Init(InitCommand),
    Message(MessageCommand),
}

/// Flat shape of every command on the wire.
///
/// Raw payloads cannot pass through serde's buffering of internally tagged enums,
/// so commands are read as one struct and then dispatched on `type`.
#[derive(Deserialize)]
struct WireCommand {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "roomId")]
    room_id: Option<String>,
    data: Payload,
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = WireCommand::deserialize(deserializer)?;

        match wire.kind.as_str() {
            "init" => {
                let room_id = wire
                    .room_id
                    .ok_or_else(|| <D::Error as de::Error>::missing_field("roomId"))?;

                Ok(ClientMessage::Init(InitCommand { room_id }))
            }
            "message" => Ok(ClientMessage::Message(MessageCommand { data: wire.data })),
            other => Err(de::Error::unknown_variant(other, &["init", "message"])),
        }
    }
}

impl ClientMessage {
    /// Parse a single frame payload into a command.
    ///
    /// Payloads which are not JSON at all are reported as [ProtocolError::Malformed],
    /// JSON without a recognized `type` or with missing fields as [ProtocolError::Unrecognized].
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(payload).map_err(ProtocolError::from)
    }

    pub fn init(room_id: impl Into<String>) -> Self {
        ClientMessage::Init(InitCommand {
            room_id: room_id.into(),
        })
    }

    pub fn message<T: Serialize + ?Sized>(data: &T) -> serde_json::Result<Self> {
        Ok(ClientMessage::Message(MessageCommand {
            data: to_payload(data)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // given a command enum, and an expect string, asserts that command is serialized / deserialized appropiately
    fn assert_command_serialization(command: &ClientMessage, expected: &str) {
        let serialized = serde_json::to_string(&command).unwrap();
        assert_eq!(serialized, expected);
        let deserialized = ClientMessage::parse(serialized.as_bytes()).unwrap();
        assert_eq!(deserialized, *command);
    }

    #[test]
    fn test_init_command() {
        assert_command_serialization(
            &ClientMessage::init("lobby1"),
            r#"{"type":"init","roomId":"lobby1"}"#,
        );
    }

    #[test]
    fn test_message_command() {
        assert_command_serialization(
            &ClientMessage::message(&json!({"x": 1})).unwrap(),
            r#"{"type":"message","data":{"x":1}}"#,
        );
    }

    #[test]
    fn test_message_data_is_kept_verbatim() {
        let data = r#"{"z":1,"a":2,"big":123456789012345678901234567890,"f":1.50}"#;
        let frame = format!(r#"{{"type":"message","data":{}}}"#, data);

        let ClientMessage::Message(command) = ClientMessage::parse(frame.as_bytes()).unwrap()
        else {
            panic!("expected a message command");
        };

        assert_eq!(payload_text(&command.data), data);
        assert_eq!(
            serde_json::to_string(&ClientMessage::Message(command)).unwrap(),
            frame
        );
    }

    #[test]
    fn test_message_without_data_is_null() {
        let command = ClientMessage::parse(br#"{"type":"message"}"#).unwrap();

        assert_eq!(command, ClientMessage::message(&json!(null)).unwrap());
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"type":"message","data":null}"#
        );
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let command = ClientMessage::parse(br#"{"type":"init","roomId":"r1","extra":true}"#).unwrap();

        assert_eq!(command, ClientMessage::init("r1"));
    }

    #[test]
    fn test_malformed_payload() {
        let err = ClientMessage::parse(b"{not json").unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let err = ClientMessage::parse(br#"{"type":"init""#).unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_unknown_type() {
        let err = ClientMessage::parse(br#"{"type":"leave","roomId":"r1"}"#).unwrap_err();

        assert!(matches!(err, ProtocolError::Unrecognized(_)));
    }

    #[test]
    fn test_missing_type() {
        let err = ClientMessage::parse(br#"{"roomId":"r1"}"#).unwrap_err();

        assert!(matches!(err, ProtocolError::Unrecognized(_)));
    }

    #[test]
    fn test_init_without_room() {
        let err = ClientMessage::parse(br#"{"type":"init"}"#).unwrap_err();

        assert!(matches!(err, ProtocolError::Unrecognized(_)));
    }
}
