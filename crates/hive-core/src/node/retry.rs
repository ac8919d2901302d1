//! Retry policy for node attempts (spec.md §4.2, §4.4.6).
//!
//! Adapted from the teacher's `executor::retry` module: exponential backoff
//! with jitter, classification-driven retry decisions. Retries apply to the
//! whole node, never to individual tool calls inside it.

use crate::error::HiveError;
use rand::Rng;
use std::time::Duration;

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

/// Default retry policy (spec.md §4.2): `unknown` and `observed-error` are
/// retriable, `confirmed-error` is not. Error-kind retriability further
/// narrows this (e.g. `tool.not_permitted` never retries).
pub fn is_retriable(error: &HiveError) -> bool {
    error.is_retriable()
}

/// Exponential backoff with jitter, base 500ms, cap 8s (spec.md §4.4.6).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(20));
    let capped = exp.min(MAX_BACKOFF_MS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert!(backoff_delay(0).as_millis() >= 500);
        assert!(backoff_delay(0).as_millis() < 650);
        assert!(backoff_delay(10).as_millis() <= 10_000);
    }

    #[test]
    fn confirmed_errors_are_not_retriable() {
        // `tool.not_permitted` models a confirmed, non-retriable failure.
        let err = HiveError::new(ErrorKind::ToolNotPermitted, "not allowed");
        assert!(!is_retriable(&err));
    }

    #[test]
    fn unknown_and_observed_errors_are_retriable() {
        let err = HiveError::new(ErrorKind::ToolTimeout, "timed out");
        assert!(is_retriable(&err));
    }
}
