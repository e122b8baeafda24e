//! Base64 payload codec.

use crate::error::StreamError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Decode a base64 record payload into UTF-8 text.
///
/// Malformed base64 and non-UTF-8 payloads are reported as
/// [`StreamError::Decode`].
pub fn decode_payload(payload: &str) -> Result<String, StreamError> {
    let bytes = decode_payload_bytes(payload)?;
    String::from_utf8(bytes).map_err(|e| StreamError::Decode(e.to_string()))
}

/// Decode a base64 record payload into raw bytes.
pub fn decode_payload_bytes(payload: &str) -> Result<Vec<u8>, StreamError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| StreamError::Decode(e.to_string()))
}

/// Encode raw bytes as a base64 record payload.
pub fn encode_payload(data: &[u8]) -> String {
    STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_payload() {
        assert_eq!(
            decode_payload("eyJkYXRlIjoxMjM0NTY3ODkwfQ==").unwrap(),
            r#"{"date":1234567890}"#
        );
    }

    #[test]
    fn test_round_trip_unicode() {
        for s in ["", "hello", "héllo wörld", "日本語 ✓", "{\"foo\":\"bar\"}\n"] {
            assert_eq!(decode_payload(&encode_payload(s.as_bytes())).unwrap(), s);
        }
    }

    #[test]
    fn test_malformed_base64() {
        let err = decode_payload("not base64!!").unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode_payload(&encode_payload(&[0xff, 0xfe, 0xfd])).unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
    }
}
