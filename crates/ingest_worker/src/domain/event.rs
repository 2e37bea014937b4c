use serde_json::{Map, Value};

use crate::domain::DecodeError;

/// Decoded message payload: exactly one top-level device key mapped to its
/// readings (reading kind → ordered array of samples).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub device_key: String,
    pub readings: Map<String, Value>,
}

/// Decode a payload into a [`DecodedEvent`].
///
/// Anything other than a JSON object with exactly one top-level key is
/// invalid; invalid payloads are acknowledged and dropped by the caller,
/// never retried. A device value that is not itself an object yields empty
/// readings rather than an error.
pub fn decode_event(payload: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(map) = value else {
        return Err(DecodeError::NotAnObject);
    };
    if map.len() != 1 {
        return Err(DecodeError::KeyCount(map.len()));
    }
    let Some((device_key, device_data)) = map.into_iter().next() else {
        return Err(DecodeError::KeyCount(0));
    };
    let readings = match device_data {
        Value::Object(readings) => readings,
        _ => Map::new(),
    };
    Ok(DecodedEvent {
        device_key,
        readings,
    })
}
