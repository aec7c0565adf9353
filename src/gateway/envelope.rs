//! # Response Envelope
//!
//! Every peer answers with `{status_code, message, data}`. Only `status_code == 200` counts
//! as success, regardless of the HTTP status the body arrived with.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{GatewayError, GatewayResult};

/// Status code a peer uses to signal success inside the envelope
pub const ENVELOPE_SUCCESS: i64 = 200;

/// Wire shape of a peer response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEnvelope<T> {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub message: String,
    pub data: T,
}

impl<T> GatewayEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status_code: ENVELOPE_SUCCESS,
            message: "ok".to_string(),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == ENVELOPE_SUCCESS
    }
}

/// Decode a response body and extract its payload
///
/// The envelope is parsed with an untyped payload first so a failed call is reported with
/// its `message` even when `data` does not match `T`.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> GatewayResult<T> {
    let envelope: GatewayEnvelope<Option<Value>> = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Json {
            message: format!("unmarshal response fail: {}", e),
        })?;

    if !envelope.is_success() {
        return Err(GatewayError::Envelope {
            status_code: envelope.status_code,
            message: envelope.message,
        });
    }

    serde_json::from_value(envelope.data.unwrap_or(Value::Null)).map_err(|e| GatewayError::Json {
        message: format!("unmarshal response data fail: {}", e),
    })
}

/// Like [`decode_envelope`] for list payloads, where a `null` payload means an empty list
pub fn decode_envelope_list<T: DeserializeOwned>(body: &[u8]) -> GatewayResult<Vec<T>> {
    decode_envelope::<Option<Vec<T>>>(body).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Teacher {
        id: String,
        name: String,
    }

    #[test]
    fn test_success_envelope() {
        let body = br#"{"status_code":200,"message":"ok","data":{"id":"T1","name":"Alice"}}"#;
        let teacher: Teacher = decode_envelope(body).unwrap();
        assert_eq!(teacher, Teacher { id: "T1".into(), name: "Alice".into() });
    }

    #[test]
    fn test_non_200_status_code_is_an_error_even_if_2xx() {
        let body = br#"{"status_code":201,"message":"created","data":{"id":"T1","name":"Alice"}}"#;
        let err = decode_envelope::<Teacher>(body).unwrap_err();
        assert!(matches!(err, GatewayError::Envelope { status_code: 201, .. }));
    }

    #[test]
    fn test_failure_message_survives_mismatched_data() {
        let body = br#"{"status_code":500,"message":"db down","data":"oops"}"#;
        let err = decode_envelope::<Teacher>(body).unwrap_err();
        assert_eq!(err.to_string(), "gateway error: db down");
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        let err = decode_envelope::<Teacher>(b"<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Json { .. }));
        assert!(err.to_string().contains("unmarshal response fail"));
    }

    #[test]
    fn test_unit_payload_accepts_null_and_missing_data() {
        decode_envelope::<()>(br#"{"status_code":200,"message":"ok","data":null}"#).unwrap();
        decode_envelope::<()>(br#"{"status_code":200,"message":"ok"}"#).unwrap();
    }

    #[test]
    fn test_null_list_is_empty() {
        let items: Vec<Teacher> =
            decode_envelope_list(br#"{"status_code":200,"message":"ok","data":null}"#).unwrap();
        assert!(items.is_empty());
    }
}
