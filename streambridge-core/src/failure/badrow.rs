//! Bad row construction: the standardized diagnostic JSON document emitted
//! for invalid and oversized messages. A bad row is a two-key document,
//! `{"schema": <kind identifier>, "data": {...}}`, with the original (or
//! truncated) payload embedded as the `payload` field.
//!
//! Construction enforces a target byte budget: the envelope and metadata are
//! measured first and the payload is truncated to whatever bytes remain. If
//! the envelope alone exceeds the budget, construction fails - a bad row is
//! never silently dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::error::{Error, Result};

pub(crate) const SIZE_VIOLATION_SCHEMA: &str = "com.streambridge/size_violation/1-0-0";
pub(crate) const GENERIC_ERROR_SCHEMA: &str = "com.streambridge/generic_error/1-0-0";
pub(crate) const FORWARDING_ERROR_SCHEMA: &str = "com.streambridge/forwarding_error/1-0-0";

// {"schema":"","data":}
const WRAPPER_BYTES: usize = 21;

const DATA_KEY_PAYLOAD: &str = "payload";

/// Inputs for a size-violation bad row.
pub struct SizeViolationInput<'a> {
    pub processor_artifact: &'a str,
    pub processor_version: &'a str,
    pub payload: &'a [u8],
    pub failure_timestamp: DateTime<Utc>,
    pub maximum_allowed_size_bytes: usize,
    pub expectation: &'a str,
}

/// Inputs for a generic-error bad row.
pub struct GenericErrorInput<'a> {
    pub processor_artifact: &'a str,
    pub processor_version: &'a str,
    pub payload: &'a [u8],
    pub failure_timestamp: DateTime<Utc>,
    pub failure_errors: Vec<String>,
}

/// Inputs for a forwarding-error bad row, produced for messages carrying a
/// typed error.
pub struct ForwardingErrorInput<'a> {
    pub processor_artifact: &'a str,
    pub processor_version: &'a str,
    pub payload: &'a [u8],
    pub failure_timestamp: DateTime<Utc>,
    pub error_type: &'a str,
    pub error_code: &'a str,
    pub error_message: &'a str,
    /// the latest transformed state of the original payload
    pub latest_state: &'a [u8],
}

/// Build a size-violation bad row JSON, compacted, within `target_byte_limit`.
pub fn size_violation(input: &SizeViolationInput<'_>, target_byte_limit: usize) -> Result<String> {
    let data = json!({
        "processor": processor(input.processor_artifact, input.processor_version),
        "failure": {
            "timestamp": format_timestamp(input.failure_timestamp),
            "maximumAllowedSizeBytes": input.maximum_allowed_size_bytes,
            "actualSizeBytes": input.payload.len(),
            "expectation": input.expectation,
        },
    });

    build(SIZE_VIOLATION_SCHEMA, data, input.payload, target_byte_limit)
}

/// Build a generic-error bad row JSON for messages without a typed error.
pub fn generic_error(input: &GenericErrorInput<'_>, target_byte_limit: usize) -> Result<String> {
    let data = json!({
        "processor": processor(input.processor_artifact, input.processor_version),
        "failure": {
            "timestamp": format_timestamp(input.failure_timestamp),
            "errors": input.failure_errors,
        },
    });

    build(GENERIC_ERROR_SCHEMA, data, input.payload, target_byte_limit)
}

/// Build a forwarding-error bad row JSON carrying the typed error's
/// machine-readable fields and the message's latest state.
pub fn forwarding_error(
    input: &ForwardingErrorInput<'_>,
    target_byte_limit: usize,
) -> Result<String> {
    let data = json!({
        "processor": processor(input.processor_artifact, input.processor_version),
        "errorType": input.error_type,
        "errorCode": input.error_code,
        "errorMessage": input.error_message,
        "latestState": String::from_utf8_lossy(input.latest_state),
        "timestamp": format_timestamp(input.failure_timestamp),
    });

    build(FORWARDING_ERROR_SCHEMA, data, input.payload, target_byte_limit)
}

fn processor(artifact: &str, version: &str) -> Value {
    json!({ "artifact": artifact, "version": version })
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Assemble `{"schema": ..., "data": ...}` with the payload fitted into the
/// remaining byte budget.
fn build(
    schema: &'static str,
    mut data: Value,
    payload: &[u8],
    target_byte_limit: usize,
) -> Result<String> {
    let map = data
        .as_object_mut()
        .ok_or_else(|| Error::BadRow("data blob is not a JSON object".to_string()))?;

    // measure the envelope without any payload content
    map.insert(DATA_KEY_PAYLOAD.to_string(), Value::String(String::new()));
    let data_bytes = serde_json::to_vec(&data)
        .map_err(|e| Error::BadRow(format!("could not serialize data blob: {e}")))?;
    let current_bytes = schema.len() + WRAPPER_BYTES + data_bytes.len();

    let bytes_for_payload = target_byte_limit.saturating_sub(current_bytes);
    if bytes_for_payload == 0 {
        return Err(Error::BadRow(
            "resultant payload would exceed the sink's byte limit".to_string(),
        ));
    }

    let payload = String::from_utf8_lossy(payload);
    let mut fitted = truncate_utf8(&payload, bytes_for_payload).to_string();

    // Escaping can inflate the serialized form past the measured budget, so
    // verify the compact output and shrink the payload until it fits.
    loop {
        if let Some(obj) = data.as_object_mut() {
            obj.insert(DATA_KEY_PAYLOAD.to_string(), Value::String(fitted.clone()));
        }
        let compact = serde_json::to_string(&json!({ "schema": schema, "data": data }))
            .map_err(|e| Error::BadRow(format!("could not compact bad row: {e}")))?;

        if compact.len() <= target_byte_limit {
            return Ok(compact);
        }
        if fitted.is_empty() {
            return Err(Error::BadRow(
                "resultant payload would exceed the sink's byte limit".to_string(),
            ));
        }

        // shrink by a further 10%
        let new_len = fitted.len() * 9 / 10;
        fitted = truncate_utf8(&fitted, new_len).to_string();
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_size_violation_shape() {
        let payload = vec![b'x'; 100];
        let row = size_violation(
            &SizeViolationInput {
                processor_artifact: "streambridge",
                processor_version: "0.1.0",
                payload: &payload,
                failure_timestamp: timestamp(),
                maximum_allowed_size_bytes: 50,
                expectation: "Expected payload to fit into requested sink",
            },
            4096,
        )
        .unwrap();

        let doc: Value = serde_json::from_str(&row).unwrap();
        assert_eq!(doc["schema"], SIZE_VIOLATION_SCHEMA);
        assert_eq!(doc["data"]["failure"]["actualSizeBytes"], 100);
        assert_eq!(doc["data"]["failure"]["maximumAllowedSizeBytes"], 50);
        assert_eq!(doc["data"]["processor"]["artifact"], "streambridge");
        assert_eq!(doc["data"]["payload"], "x".repeat(100));
        assert_eq!(doc["data"]["failure"]["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_generic_error_carries_error_strings() {
        let row = generic_error(
            &GenericErrorInput {
                processor_artifact: "streambridge",
                processor_version: "0.1.0",
                payload: b"some payload",
                failure_timestamp: timestamp(),
                failure_errors: vec!["boom".to_string()],
            },
            4096,
        )
        .unwrap();

        let doc: Value = serde_json::from_str(&row).unwrap();
        assert_eq!(doc["schema"], GENERIC_ERROR_SCHEMA);
        assert_eq!(doc["data"]["failure"]["errors"][0], "boom");
        assert_eq!(doc["data"]["payload"], "some payload");
    }

    #[test]
    fn test_forwarding_error_carries_latest_state() {
        let row = forwarding_error(
            &ForwardingErrorInput {
                processor_artifact: "streambridge",
                processor_version: "0.1.0",
                payload: b"original",
                failure_timestamp: timestamp(),
                error_type: "transformation",
                error_code: "SyntaxError",
                error_message: "could not parse",
                latest_state: b"transformed",
            },
            4096,
        )
        .unwrap();

        let doc: Value = serde_json::from_str(&row).unwrap();
        assert_eq!(doc["schema"], FORWARDING_ERROR_SCHEMA);
        assert_eq!(doc["data"]["errorType"], "transformation");
        assert_eq!(doc["data"]["errorCode"], "SyntaxError");
        assert_eq!(doc["data"]["latestState"], "transformed");
        assert_eq!(doc["data"]["payload"], "original");
    }

    #[test]
    fn test_payload_truncated_to_budget() {
        let payload = "y".repeat(10_000);
        let row = size_violation(
            &SizeViolationInput {
                processor_artifact: "streambridge",
                processor_version: "0.1.0",
                payload: payload.as_bytes(),
                failure_timestamp: timestamp(),
                maximum_allowed_size_bytes: 100,
                expectation: "fit",
            },
            512,
        )
        .unwrap();

        assert!(row.len() <= 512);
        let doc: Value = serde_json::from_str(&row).unwrap();
        let embedded = doc["data"]["payload"].as_str().unwrap();
        assert!(!embedded.is_empty());
        assert!(embedded.len() < payload.len());
        // size metadata still reflects the full payload
        assert_eq!(doc["data"]["failure"]["actualSizeBytes"], 10_000);
    }

    #[test]
    fn test_truncation_respects_utf8_boundaries() {
        // multi-byte characters near the cut point must not be split
        let payload = "日本語のテキスト".repeat(200);
        let row = generic_error(
            &GenericErrorInput {
                processor_artifact: "streambridge",
                processor_version: "0.1.0",
                payload: payload.as_bytes(),
                failure_timestamp: timestamp(),
                failure_errors: vec![],
            },
            600,
        )
        .unwrap();

        assert!(row.len() <= 600);
        // parseable means no broken character escaped into the JSON
        let doc: Value = serde_json::from_str(&row).unwrap();
        assert!(doc["data"]["payload"].is_string());
    }

    #[test]
    fn test_envelope_over_budget_fails() {
        let err = generic_error(
            &GenericErrorInput {
                processor_artifact: "streambridge",
                processor_version: "0.1.0",
                payload: b"p",
                failure_timestamp: timestamp(),
                failure_errors: vec!["e".repeat(500)],
            },
            200,
        )
        .expect_err("envelope alone exceeds the budget");

        assert!(matches!(err, Error::BadRow(_)));
    }
}
