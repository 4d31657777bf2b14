use common::domain::DeadLetterRecord;
use std::collections::BTreeMap;
use tracing::error;

/// Turns a dead-lettered message into a single structured alert line
#[derive(Clone, Default)]
pub struct DeadLetterService;

impl DeadLetterService {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(
        &self,
        event_id: &str,
        body: &[u8],
        attributes: BTreeMap<String, String>,
    ) -> DeadLetterRecord {
        let record = DeadLetterRecord::from_body(event_id, body, attributes);

        match serde_json::to_string(&record) {
            Ok(dead_letter) => error!(
                event_id = %record.event_id,
                dead_letter = %dead_letter,
                "{}",
                record.message
            ),
            Err(e) => error!(
                event_id = %record.event_id,
                failed_payload = %record.failed_payload,
                error = %e,
                "{}",
                record.message
            ),
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DEAD_LETTER_ALERT, NO_PAYLOAD};

    #[test]
    fn test_handle_builds_alert_record() {
        let mut attributes = BTreeMap::new();
        attributes.insert("subject".to_string(), "events_dlq.transformer".to_string());

        let record = DeadLetterService::new().handle("42", b"not-json", attributes.clone());

        assert_eq!(record.severity, "ERROR");
        assert_eq!(record.message, DEAD_LETTER_ALERT);
        assert_eq!(record.failed_payload, "not-json");
        assert_eq!(record.event_id, "42");
        assert_eq!(record.message_attributes, attributes);
    }

    #[test]
    fn test_handle_tolerates_empty_and_binary_bodies() {
        let service = DeadLetterService::new();

        assert_eq!(service.handle("1", b"", BTreeMap::new()).failed_payload, NO_PAYLOAD);
        assert!(service
            .handle("2", &[0xc3, 0x28], BTreeMap::new())
            .failed_payload
            .starts_with("Failed to decode payload: "));
    }
}
