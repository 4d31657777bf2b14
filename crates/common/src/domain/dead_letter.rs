use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEAD_LETTER_SEVERITY: &str = "ERROR";
pub const DEAD_LETTER_ALERT: &str = "DEAD LETTER QUEUE ALERT: Failed message detected in pipeline.";
pub const NO_PAYLOAD: &str = "No payload data provided";

/// Terminal record for a message that exhausted its delivery budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub severity: String,
    pub message: String,
    pub failed_payload: String,
    pub message_attributes: BTreeMap<String, String>,
    pub event_id: String,
}

impl DeadLetterRecord {
    /// Build the alert from a raw body. Never fails: an undecodable body is
    /// replaced by a description of why it could not be decoded.
    pub fn from_body(
        event_id: impl Into<String>,
        body: &[u8],
        message_attributes: BTreeMap<String, String>,
    ) -> Self {
        let failed_payload = if body.is_empty() {
            NO_PAYLOAD.to_string()
        } else {
            match std::str::from_utf8(body) {
                Ok(text) => text.to_string(),
                Err(e) => format!("Failed to decode payload: {e}"),
            }
        };

        Self {
            severity: DEAD_LETTER_SEVERITY.to_string(),
            message: DEAD_LETTER_ALERT.to_string(),
            failed_payload,
            message_attributes,
            event_id: event_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body_keeps_text_payload() {
        let mut attrs = BTreeMap::new();
        attrs.insert("Shopstream-Delivery-Attempts".to_string(), "5".to_string());

        let record = DeadLetterRecord::from_body("42", b"not-json", attrs.clone());

        assert_eq!(record.severity, "ERROR");
        assert_eq!(record.message, DEAD_LETTER_ALERT);
        assert_eq!(record.failed_payload, "not-json");
        assert_eq!(record.message_attributes, attrs);
        assert_eq!(record.event_id, "42");
    }

    #[test]
    fn test_from_body_describes_decode_failure() {
        let record = DeadLetterRecord::from_body("1", &[0xc3, 0x28], BTreeMap::new());
        assert!(record.failed_payload.starts_with("Failed to decode payload"));
    }

    #[test]
    fn test_from_body_empty() {
        let record = DeadLetterRecord::from_body("1", b"", BTreeMap::new());
        assert_eq!(record.failed_payload, NO_PAYLOAD);
    }

    #[test]
    fn test_serialized_shape() {
        let record = DeadLetterRecord::from_body("9", b"{}", BTreeMap::new());
        let json = serde_json::to_value(&record).unwrap();
        for key in [
            "severity",
            "message",
            "failed_payload",
            "message_attributes",
            "event_id",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
