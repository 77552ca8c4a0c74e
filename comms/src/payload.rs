use serde::Serialize;
use serde_json::value::RawValue;

/// JSON exactly as the sender wrote it, key order and number spelling included.
///
/// `None` stands for a missing or `null` value and is written out as `null`.
pub type Payload = Option<Box<RawValue>>;

/// Serializes `value` into a [Payload]
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Payload> {
    serde_json::value::to_raw_value(value).map(Some)
}

/// The JSON text of a payload
pub fn payload_text(payload: &Payload) -> &str {
    payload.as_deref().map_or("null", RawValue::get)
}
