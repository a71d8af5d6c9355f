//! Property-based tests for the retry policy

use chrono::{TimeZone, Utc};
use fieldops::client::offline::{RetryDecision, RetryPolicy};
use fieldops::client::remote::DeliveryError;
use proptest::prelude::*;
use std::time::Duration;

fn retryable() -> impl Strategy<Value = DeliveryError> {
    prop_oneof![
        Just(DeliveryError::Timeout),
        "[a-z ]{0,16}".prop_map(DeliveryError::Transient),
        "[a-z ]{0,16}".prop_map(DeliveryError::Offline),
    ]
}

fn refused() -> impl Strategy<Value = DeliveryError> {
    prop_oneof![
        "[a-z ]{0,16}".prop_map(DeliveryError::Conflict),
        (400u16..500, "[a-z ]{0,16}").prop_map(|(status, message)| DeliveryError::Permanent { status, message }),
    ]
}

proptest! {
    #[test]
    fn test_retry_stays_within_budget(
        base_ms in 0u64..60_000,
        max in 1u32..8,
        attempts in 1u32..16,
        error in retryable(),
    ) {
        let policy = RetryPolicy::new(Duration::from_millis(base_ms), max);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        match policy.decide(attempts, &error, now) {
            RetryDecision::RetryAt(at) => {
                prop_assert!(attempts < max);
                prop_assert!(at >= now);
            }
            RetryDecision::Exhausted => prop_assert!(attempts >= max),
            RetryDecision::Rejected => prop_assert!(false, "retryable error was rejected"),
        }
    }

    #[test]
    fn test_later_attempts_wait_longer(base_ms in 1u64..60_000, attempts in 1u32..6) {
        let policy = RetryPolicy::new(Duration::from_millis(base_ms), 10);
        let now = Utc::now();
        let error = DeliveryError::Timeout;

        let (RetryDecision::RetryAt(first), RetryDecision::RetryAt(second)) =
            (policy.decide(attempts, &error, now), policy.decide(attempts + 1, &error, now))
        else {
            return Err(TestCaseError::fail("expected both attempts to be retried"));
        };
        prop_assert!(second > first);
    }

    #[test]
    fn test_refusals_never_retry(attempts in 0u32..16, error in refused()) {
        let policy = RetryPolicy::default();
        prop_assert_eq!(policy.decide(attempts, &error, Utc::now()), RetryDecision::Rejected);
    }
}
