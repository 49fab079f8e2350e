// Clock abstraction for deterministic time control.
//
// Block timestamps in the test ledger come from a Clock, so tests that run
// with paused tokio time get reproducible block times.

use std::future::Future;
use std::pin::Pin;
use tokio::time::{self, Duration, Instant};

/// Clock abstraction trait
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use tokio::time::Duration;
/// use savings_tck::orchestrator::{Clock, PausedClock};
///
/// #[tokio::test(start_paused = true)]
/// async fn test_with_paused_time() {
///     let clock = Arc::new(PausedClock::new());
///     let start = clock.now();
///     clock.advance(Duration::from_secs(3600)).await;
///     assert_eq!(clock.now() - start, Duration::from_secs(3600));
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current instant
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration
    ///
    /// With a paused runtime this completes as soon as time is advanced past
    /// the deadline, without real waiting.
    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        time::Instant::now()
    }

    fn sleep(&self, d: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(time::sleep(d))
    }
}

/// Paused clock for tests
///
/// Time only moves when [`PausedClock::advance`] is called. Use together
/// with `#[tokio::test(start_paused = true)]`, or let `new()` pause the
/// current-thread runtime.
pub struct PausedClock;

impl PausedClock {
    /// Creates a new PausedClock and pauses tokio time
    ///
    /// # Panics
    ///
    /// Panics when called outside a current-thread tokio runtime, or when
    /// time is already paused.
    pub fn new() -> Self {
        time::pause();
        Self
    }

    /// Creates a PausedClock for a runtime that was started paused
    pub fn already_paused() -> Self {
        Self
    }

    /// Advance tokio time, waking every sleep whose deadline passes
    pub async fn advance(&self, duration: Duration) {
        time::advance(duration).await;
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::already_paused()
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
