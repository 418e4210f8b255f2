//! Bounded waits over externally-driven document changes

use std::fmt::Display;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

// Keeps a zero interval from spinning without ever yielding to the timer.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Evaluates `predicate` immediately, then every `interval`, until it yields a
/// value or `timeout` has elapsed.
///
/// Never fails: an `Err` from the predicate counts as "not yet", and a timeout
/// resolves to `None` so the caller decides whether that is fatal. Returns no
/// later than `timeout + interval` after the call; the final sleep is clipped
/// to the deadline.
pub async fn wait_for_condition<T, E, F>(
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
) -> Option<T>
where
    F: FnMut() -> Result<Option<T>, E>,
    E: Display,
{
    let started = Instant::now();
    // A timeout past the clock's range never expires.
    let deadline = started.checked_add(timeout);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match predicate() {
            Ok(Some(value)) => {
                trace!(attempts, elapsed = ?started.elapsed(), "condition met");
                return Some(value);
            }
            Ok(None) => {}
            Err(e) => debug!(attempt = attempts, error = %e, "predicate failed; treating as not yet"),
        }

        let mut tick = interval.max(MIN_TICK);
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                debug!(attempts, ?timeout, "condition not met before timeout");
                return None;
            }
            tick = tick.min(deadline - now);
        }
        sleep(tick).await;
    }
}

/// [`wait_for_condition`] for predicates that cannot fail.
pub async fn wait_for<T, F>(mut predicate: F, timeout: Duration, interval: Duration) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    wait_for_condition(
        || Ok::<_, std::convert::Infallible>(predicate()),
        timeout,
        interval,
    )
    .await
}
