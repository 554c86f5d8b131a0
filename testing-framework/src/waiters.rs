// File: testing-framework/src/waiters.rs
//
// Condition Poller
//
// Deterministic waiting for asynchronously delivered state. A probe is polled
// at a fixed interval until it satisfies a comparison or a timeout elapses.
// Reaching the timeout is not itself an error: callers follow every wait with
// `check_condition`, which is the single place a failure gets reported.

use log::{debug, info, log_enabled, warn, Level};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Duration;

use crate::error::HarnessError;
use crate::orchestrator::Clock;

// A zero interval would spin without ever yielding to the timer
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Comparison applied between the observed value and the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// `actual == threshold`
    Equal,
    /// `actual >= threshold`
    AtLeast,
    /// `actual <= threshold`
    AtMost,
}

impl Comparator {
    /// Whether `actual` satisfies this comparison against `threshold`.
    pub fn holds(&self, actual: u64, threshold: u64) -> bool {
        match self {
            Comparator::Equal => actual == threshold,
            Comparator::AtLeast => actual >= threshold,
            Comparator::AtMost => actual <= threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Comparator::Equal => "equal to",
            Comparator::AtLeast => "at least",
            Comparator::AtMost => "at most",
        };
        f.write_str(text)
    }
}

impl FromStr for Comparator {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "equal" | "equals" | "equal_to" | "eq" | "exactly" | "==" => Ok(Comparator::Equal),
            "at_least" | "gte" | ">=" => Ok(Comparator::AtLeast),
            "at_most" | "lte" | "<=" => Ok(Comparator::AtMost),
            _ => Err(HarnessError::UnknownComparator(s.to_string())),
        }
    }
}

/// Wait until `get_value()` satisfies `comparator` against `threshold`.
///
/// The probe is evaluated immediately and then every `poll_interval`. The poll
/// loop and a single timeout guard race each other; whichever finishes first
/// drops the other, so no timer outlives the call.
///
/// # Returns
///
/// * `true` - The condition held before the timeout
/// * `false` - The timeout elapsed first
///
/// `get_value` must be free of side effects; it may be called many times.
///
/// # Example
///
/// ```ignore
/// let met = await_condition(
///     &clock,
///     || context.call_count("created").unwrap_or(0),
///     Comparator::AtLeast,
///     2,
///     Duration::from_millis(100),
///     Duration::from_secs(10),
/// )
/// .await;
/// ```
pub async fn await_condition<F>(
    clock: &dyn Clock,
    get_value: F,
    comparator: Comparator,
    threshold: u64,
    poll_interval: Duration,
    timeout: Duration,
) -> bool
where
    F: Fn() -> u64,
{
    let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
    let start = clock.now();

    let poll = async {
        loop {
            if comparator.holds(get_value(), threshold) {
                return;
            }
            clock.sleep(poll_interval).await;
        }
    };

    let satisfied = tokio::select! {
        biased;
        _ = poll => true,
        _ = clock.sleep(timeout) => false,
    };

    if log_enabled!(Level::Debug) {
        debug!(
            "Wait for value {} {} finished after {:?} (satisfied: {})",
            comparator,
            threshold,
            clock.now() - start,
            satisfied
        );
    }

    satisfied
}

/// Final deterministic check after a wait.
///
/// Logs a success line when the comparison holds, otherwise returns
/// [`HarnessError::ConditionNotMet`] naming the subject, the comparator, the
/// expected and the actual value.
pub fn check_condition(
    subject: &str,
    actual: u64,
    comparator: Comparator,
    threshold: u64,
) -> Result<(), HarnessError> {
    if comparator.holds(actual, threshold) {
        info!("✓ {} is {} {} (actual {})", subject, comparator, threshold, actual);
        return Ok(());
    }

    warn!(
        "✗ {} expected {} {}, got {}",
        subject, comparator, threshold, actual
    );
    Err(HarnessError::ConditionNotMet {
        subject: subject.to_string(),
        comparator,
        expected: threshold,
        actual,
    })
}

/// Wait for a condition, then check it once more.
///
/// This is the composition test steps use: the wait absorbs delivery latency,
/// the post-check turns a timed-out wait into a descriptive failure.
pub async fn assert_eventually<F>(
    clock: &dyn Clock,
    subject: &str,
    get_value: F,
    comparator: Comparator,
    threshold: u64,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), HarnessError>
where
    F: Fn() -> u64,
{
    await_condition(
        clock,
        &get_value,
        comparator,
        threshold,
        poll_interval,
        timeout,
    )
    .await;

    check_condition(subject, get_value(), comparator, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PausedClock;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const POLL: Duration = Duration::from_millis(10);
    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_returns_immediately_when_already_satisfied() {
        let clock = PausedClock::new();
        let start = clock.now();

        let met = await_condition(&clock, || 7, Comparator::Equal, 7, POLL, TIMEOUT).await;

        assert!(met);
        assert_eq!(clock.now() - start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_detected_before_timeout() {
        let clock = PausedClock::new();
        let counter = Arc::new(AtomicU64::new(0));

        let writer = counter.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(50)).await;
                writer.fetch_add(1, Ordering::SeqCst);
            }
        });

        let start = clock.now();
        let met = await_condition(
            &clock,
            || counter.load(Ordering::SeqCst),
            Comparator::Equal,
            3,
            POLL,
            TIMEOUT,
        )
        .await;

        assert!(met);
        let elapsed = clock.now() - start;
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_without_error() {
        let clock = PausedClock::new();
        let start = clock.now();

        let met = await_condition(&clock, || 1, Comparator::AtLeast, 2, POLL, TIMEOUT).await;

        assert!(!met);
        assert_eq!(clock.now() - start, TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_eventually_reports_expected_and_actual() {
        let clock = PausedClock::new();

        let err = assert_eventually(
            &clock,
            "listener 'blocks' call count",
            || 1,
            Comparator::AtLeast,
            2,
            POLL,
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("at least 2"), "{}", message);
        assert!(message.contains("got 1"), "{}", message);
        assert!(matches!(
            err,
            HarnessError::ConditionNotMet {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_waits_for_value_to_drop() {
        let clock = PausedClock::new();
        let value = Arc::new(AtomicU64::new(10));

        let writer = value.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.store(2, Ordering::SeqCst);
        });

        let result = assert_eventually(
            &clock,
            "pending",
            || value.load(Ordering::SeqCst),
            Comparator::AtMost,
            3,
            POLL,
            TIMEOUT,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_times_out() {
        let clock = PausedClock::new();

        let met = await_condition(
            &clock,
            || 0,
            Comparator::Equal,
            1,
            Duration::ZERO,
            Duration::from_millis(20),
        )
        .await;

        assert!(!met);
    }

    #[test]
    fn test_comparator_semantics() {
        assert!(Comparator::Equal.holds(3, 3));
        assert!(!Comparator::Equal.holds(4, 3));
        assert!(Comparator::AtLeast.holds(4, 3));
        assert!(!Comparator::AtLeast.holds(2, 3));
        assert!(Comparator::AtMost.holds(0, 3));
        assert!(!Comparator::AtMost.holds(5, 3));
    }

    #[test]
    fn test_comparator_parsing() {
        assert_eq!("equal".parse::<Comparator>().unwrap(), Comparator::Equal);
        assert_eq!("At Least".parse::<Comparator>().unwrap(), Comparator::AtLeast);
        assert_eq!("<=".parse::<Comparator>().unwrap(), Comparator::AtMost);

        let err = "roughly".parse::<Comparator>().unwrap_err();
        assert!(matches!(err, HarnessError::UnknownComparator(ref s) if s == "roughly"));
    }

    #[test]
    fn test_check_condition_success() {
        assert!(check_condition("count", 3, Comparator::Equal, 3).is_ok());
    }
}
