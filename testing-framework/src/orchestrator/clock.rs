// File: testing-framework/src/orchestrator/clock.rs
//
// Clock Abstraction
//
// Waits in the harness (condition polling, scenario time steps) go through this
// trait so tests can run them against tokio's paused time instead of the wall clock.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Clock abstraction trait - every wait in the harness depends on this trait
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use chainwatch_testing_framework::orchestrator::clock::{Clock, SystemClock};
///
/// #[tokio::main]
/// async fn main() {
///     let clock: Arc<dyn Clock> = Arc::new(SystemClock);
///     let start = clock.now();
///     clock.sleep(Duration::from_millis(10)).await;
///     assert!(clock.now() - start >= Duration::from_millis(10));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current instant in time
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration
    ///
    /// Under a paused tokio runtime the sleep completes as soon as the runtime
    /// is idle, with time auto-advanced to the deadline.
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// System real-time clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Paused clock (test environment)
///
/// Works with tokio's paused time. Time moves when the runtime auto-advances
/// an idle sleep or when `advance()` is called.
///
/// # Important Notes
///
/// 1. Use `#[tokio::test(start_paused = true)]` and build with `new()`
/// 2. On an unpaused current-thread runtime build with `pause_time()` instead;
///    tokio panics if time is paused twice
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use chainwatch_testing_framework::orchestrator::clock::{Clock, PausedClock};
///
/// #[tokio::test(start_paused = true)]
/// async fn test_wait_budget() {
///     let clock = Arc::new(PausedClock::new());
///     let start = clock.now();
///
///     clock.advance(Duration::from_secs(5)).await;
///     assert_eq!(clock.now() - start, Duration::from_secs(5));
/// }
/// ```
pub struct PausedClock;

impl PausedClock {
    /// Creates a PausedClock for a runtime whose time is already paused
    pub fn new() -> Self {
        Self
    }

    /// Pauses tokio time, then creates the clock
    pub fn pause_time() -> Self {
        time::pause();
        Self
    }

    /// Moves paused time forward, firing every timer that expires on the way
    pub async fn advance(&self, d: Duration) {
        time::advance(d).await
    }
}

impl Clock for PausedClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}
