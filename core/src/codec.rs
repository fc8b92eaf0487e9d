//! Wire codec for CIMI payloads.
//!
//! The client speaks a single media type for both `Accept` negotiation and
//! request bodies. CIMI defines XML and JSON renderings; this crate uses JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CimiError;

/// Media type sent in `Accept` and `content-type`.
pub const MEDIA_TYPE: &str = "application/json";

/// Encode a request payload.
pub fn encode<B: Serialize + ?Sized>(body: &B) -> Result<String, CimiError> {
    serde_json::to_string(body).map_err(|e| CimiError::Serialization(e.to_string()))
}

/// Decode a response payload into the caller's chosen type.
pub fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, CimiError> {
    serde_json::from_str(payload).map_err(|e| CimiError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reports_malformed_payload() {
        let err = decode::<serde_json::Value>("<Machine/>").unwrap_err();
        assert!(matches!(err, CimiError::Deserialization(_)));
    }

    #[test]
    fn encode_produces_json() {
        let body = encode(&serde_json::json!({"name": "vm-1"})).unwrap();
        assert_eq!(body, r#"{"name":"vm-1"}"#);
    }
}
