use crate::domain::result::DomainResult;
use async_trait::async_trait;
use garde::Validate;
use serde_json::{Map, Value};

pub const USER_ID_FIELD: &str = "userId";
pub const EVENT_TYPE_FIELD: &str = "eventType";
pub const PAYLOAD_FIELD: &str = "payload";
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Event as received from a client or a bulk file line.
///
/// Only the fields the pipeline needs are lifted out of the JSON object; the
/// object itself is what travels through the queue, untouched.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct RawEvent {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(length(min = 1))]
    pub event_type: String,
    #[garde(skip)]
    pub payload: Option<Value>,
    #[garde(skip)]
    pub timestamp: Option<String>,
}

impl RawEvent {
    /// Lift the known fields out of a JSON object.
    ///
    /// Missing or non-string `userId`/`eventType` become empty strings so that
    /// validation rejects them. A JSON `null` payload is treated as absent.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let string_field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            user_id: string_field(USER_ID_FIELD),
            event_type: string_field(EVENT_TYPE_FIELD),
            payload: object
                .get(PAYLOAD_FIELD)
                .filter(|value| !value.is_null())
                .cloned(),
            timestamp: object
                .get(TIMESTAMP_FIELD)
                .and_then(Value::as_str)
                .filter(|ts| !ts.is_empty())
                .map(str::to_string),
        }
    }
}

/// Parse bytes into a non-empty JSON object.
///
/// Returns a human-readable reason on failure; callers decide which error
/// kind that reason maps to.
pub fn parse_event_object(bytes: &[u8]) -> Result<Map<String, Value>, String> {
    if bytes.is_empty() {
        return Err("empty body".to_string());
    }

    let text = std::str::from_utf8(bytes).map_err(|e| format!("body is not UTF-8: {e}"))?;

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        Ok(Value::Object(_)) => Err("empty JSON object".to_string()),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Trait for publishing raw events to the durable queue
///
/// Implementations must only return once the broker has confirmed durable
/// acceptance of the message.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RawEventProducer: Send + Sync {
    async fn publish_raw_event(&self, event: &Value) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garde::validate_struct;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_from_object_extracts_fields() {
        let event = RawEvent::from_object(&object(json!({
            "userId": "u1",
            "eventType": "click",
            "payload": {"sku": "A-1"},
            "timestamp": "2024-01-01T10:00:00Z"
        })));

        assert_eq!(event.user_id, "u1");
        assert_eq!(event.event_type, "click");
        assert_eq!(event.payload, Some(json!({"sku": "A-1"})));
        assert_eq!(event.timestamp.as_deref(), Some("2024-01-01T10:00:00Z"));
        assert!(validate_struct(&event).is_ok());
    }

    #[test]
    fn test_missing_user_id_fails_validation() {
        let event = RawEvent::from_object(&object(json!({"eventType": "click"})));
        assert!(validate_struct(&event).is_err());
    }

    #[test]
    fn test_non_string_fields_are_treated_as_missing() {
        let event = RawEvent::from_object(&object(json!({"userId": 42, "eventType": "click"})));
        assert_eq!(event.user_id, "");
        assert!(validate_struct(&event).is_err());
    }

    #[test]
    fn test_null_payload_is_absent() {
        let event = RawEvent::from_object(&object(json!({
            "userId": "u1",
            "eventType": "click",
            "payload": null
        })));
        assert!(event.payload.is_none());
    }

    #[test]
    fn test_empty_object_payload_is_kept() {
        let event = RawEvent::from_object(&object(json!({
            "userId": "u1",
            "eventType": "click",
            "payload": {}
        })));
        assert_eq!(event.payload, Some(json!({})));
    }

    #[test]
    fn test_parse_event_object_rejects_bad_input() {
        assert!(parse_event_object(b"").is_err());
        assert!(parse_event_object(b"not-json").is_err());
        assert!(parse_event_object(b"{}").is_err());
        assert!(parse_event_object(b"[1,2]").is_err());
        assert!(parse_event_object(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_parse_event_object_accepts_object() {
        let map = parse_event_object(br#"{"userId":"u1","eventType":"click"}"#).unwrap();
        assert_eq!(map.get("userId"), Some(&json!("u1")));
    }
}
