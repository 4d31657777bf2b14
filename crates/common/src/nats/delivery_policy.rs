use crate::nats::ConsumeResponse;
use std::time::Duration;

pub const ORIGINAL_MESSAGE_ID_HEADER: &str = "Shopstream-Original-Message-Id";
pub const DELIVERY_ATTEMPTS_HEADER: &str = "Shopstream-Delivery-Attempts";
pub const FAILURE_REASON_HEADER: &str = "Shopstream-Failure-Reason";
pub const SOURCE_CONSUMER_HEADER: &str = "Shopstream-Source-Consumer";

pub const DEFAULT_MAX_DELIVER: u64 = 5;

/// How the consumer settles a message after the service answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Retry(Duration),
    DeadLetter(String),
}

/// Redelivery budget and backoff schedule shared by every consumer.
///
/// Attempt `n` (1-based) that fails waits `backoff[n - 1]` before the next
/// delivery; the last entry repeats once the schedule is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_deliver: u64,
    pub backoff: Vec<Duration>,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_deliver: DEFAULT_MAX_DELIVER,
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(30),
            ],
        }
    }
}

impl DeliveryPolicy {
    pub fn new(max_deliver: u64, backoff: Vec<Duration>) -> Self {
        Self {
            max_deliver: max_deliver.max(1),
            backoff,
        }
    }

    pub fn from_secs(max_deliver: u64, backoff_secs: &[u64]) -> Self {
        Self::new(
            max_deliver,
            backoff_secs.iter().copied().map(Duration::from_secs).collect(),
        )
    }

    pub fn backoff_for(&self, attempt: u64) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }

    pub fn decide(&self, response: &ConsumeResponse, attempt: u64) -> Disposition {
        match response {
            ConsumeResponse::Ack => Disposition::Ack,
            ConsumeResponse::Reject(reason) => Disposition::DeadLetter(reason.clone()),
            ConsumeResponse::Nak(reason) if attempt >= self.max_deliver => {
                Disposition::DeadLetter(reason.clone())
            }
            ConsumeResponse::Nak(_) => Disposition::Retry(self.backoff_for(attempt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_is_ack() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.decide(&ConsumeResponse::Ack, 1), Disposition::Ack);
    }

    #[test]
    fn test_nak_retries_with_backoff_until_budget_exhausted() {
        let policy = DeliveryPolicy::default();
        let nak = ConsumeResponse::nak("decode failed");

        assert_eq!(policy.decide(&nak, 1), Disposition::Retry(Duration::from_secs(1)));
        assert_eq!(policy.decide(&nak, 2), Disposition::Retry(Duration::from_secs(5)));
        assert_eq!(policy.decide(&nak, 3), Disposition::Retry(Duration::from_secs(30)));
        assert_eq!(policy.decide(&nak, 4), Disposition::Retry(Duration::from_secs(30)));
        assert_eq!(
            policy.decide(&nak, 5),
            Disposition::DeadLetter("decode failed".to_string())
        );
    }

    #[test]
    fn test_reject_dead_letters_on_first_attempt() {
        let policy = DeliveryPolicy::default();
        assert_eq!(
            policy.decide(&ConsumeResponse::reject("missing userId"), 1),
            Disposition::DeadLetter("missing userId".to_string())
        );
    }

    #[test]
    fn test_empty_backoff_retries_immediately() {
        let policy = DeliveryPolicy::from_secs(3, &[]);
        assert_eq!(
            policy.decide(&ConsumeResponse::nak("x"), 1),
            Disposition::Retry(Duration::ZERO)
        );
    }

    #[test]
    fn test_max_deliver_is_at_least_one() {
        let policy = DeliveryPolicy::new(0, vec![]);
        assert_eq!(policy.max_deliver, 1);
        assert!(matches!(
            policy.decide(&ConsumeResponse::nak("x"), 1),
            Disposition::DeadLetter(_)
        ));
    }
}
