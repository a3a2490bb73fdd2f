//! Helpers for reading self-describing CBOR values.

use ciborium::value::Value;

/// CBOR self-describe tag (`0xd9d9f7` prefix).
pub const SELF_DESCRIBE_TAG: u64 = 55799;

/// Decode CBOR bytes into a value, unwrapping a leading self-describe tag.
pub fn decode(bytes: &[u8]) -> Result<Value, String> {
    let value: Value = ciborium::de::from_reader(bytes).map_err(|e| e.to_string())?;
    Ok(match value {
        Value::Tag(SELF_DESCRIBE_TAG, inner) => *inner,
        other => other,
    })
}

/// Encode a value with the self-describe tag.
pub fn encode(value: Value) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&Value::Tag(SELF_DESCRIBE_TAG, Box::new(value)), &mut bytes)
        .map_err(|e| e.to_string())?;
    Ok(bytes)
}

/// Look up a text key in a CBOR map.
pub fn map_get<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Text(text) if text == key))
        .map(|(_, v)| v)
}

pub fn as_bytes(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Bytes(bytes) => Some(bytes),
        _ => None,
    }
}

pub fn as_text(value: &Value) -> Option<&str> {
    match value {
        Value::Text(text) => Some(text),
        _ => None,
    }
}

pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(int) => u64::try_from(*int).ok(),
        _ => None,
    }
}

pub fn text_key(key: &str) -> Value {
    Value::Text(key.to_string())
}
