//! Message codec: the typed payload carried by each frame.
//!
//! A [`Value`] is null, boolean, number, string, array or string-keyed
//! object. Payload bytes are its JSON encoding. `null` is reserved as the
//! goodbye sentinel and is never an application message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;

pub use serde_json::Value;

/// The value sent as the final frame of a closing connection.
pub const GOODBYE: Value = Value::Null;

/// Returns true if `value` is the goodbye sentinel.
pub fn is_goodbye(value: &Value) -> bool {
    value.is_null()
}

/// Encode a value into payload bytes.
pub fn encode_value(value: &Value) -> Result<Bytes> {
    let mut writer = BytesMut::new().writer();
    serde_json::to_writer(&mut writer, value)?;
    Ok(writer.into_inner().freeze())
}

/// Decode payload bytes into a value.
///
/// The whole payload must be consumed; trailing bytes are an error.
pub fn decode_value(payload: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::FrameError;

    #[test]
    fn nested_value_survives_codec() {
        let value = json!({
            "__TYPE": "ProgressUpdate",
            "state": "Loading",
            "percent": 42,
            "tags": ["a", null, true, 1.5],
            "nested": { "empty": {} }
        });

        let bytes = encode_value(&value).unwrap();
        assert_eq!(decode_value(&bytes).unwrap(), value);
    }

    #[test]
    fn floats_survive_codec_bit_for_bit() {
        // xorshift64 over raw bit patterns, covering tiny, huge and subnormal values.
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut checked = 0;
        while checked < 20_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let float = f64::from_bits(state);
            if !float.is_finite() {
                continue;
            }
            checked += 1;

            let bytes = encode_value(&json!(float)).unwrap();
            let decoded = decode_value(&bytes).unwrap().as_f64().unwrap();
            assert_eq!(decoded.to_bits(), float.to_bits(), "{float:e} came back as {decoded:e}");
        }

        for float in [1.0715660391465826e-75, f64::MIN_POSITIVE, 5e-324, f64::MAX, -0.1] {
            let bytes = encode_value(&json!(float)).unwrap();
            assert_eq!(decode_value(&bytes).unwrap().as_f64(), Some(float));
        }
    }

    #[test]
    fn goodbye_is_null() {
        assert!(is_goodbye(&GOODBYE));
        assert!(!is_goodbye(&json!(0)));
        assert_eq!(encode_value(&GOODBYE).unwrap().as_ref(), b"null");
    }

    #[test]
    fn trailing_bytes_rejected() {
        let result = decode_value(b"42 43");
        assert!(matches!(result, Err(FrameError::Codec(_))));
    }

    #[test]
    fn empty_payload_rejected() {
        assert!(matches!(decode_value(b""), Err(FrameError::Codec(_))));
    }
}
