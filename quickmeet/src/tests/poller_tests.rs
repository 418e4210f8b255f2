use std::cell::Cell;
use std::time::Duration;

use tokio::time::Instant;

use crate::poller::{wait_for, wait_for_condition};

#[tokio::test(start_paused = true)]
async fn test_immediate_success_does_not_sleep() {
    let started = Instant::now();
    let found = wait_for(|| Some(7), Duration::from_secs(5), Duration::from_millis(100)).await;
    assert_eq!(found, Some(7));
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_bounded_for_any_interval() {
    let cases = [
        (Duration::from_millis(500), Duration::from_millis(100)),
        (Duration::from_millis(500), Duration::from_millis(300)),
        (Duration::from_millis(50), Duration::from_secs(2)),
        (Duration::from_millis(120), Duration::ZERO),
        (Duration::ZERO, Duration::from_millis(10)),
    ];
    for (timeout, interval) in cases {
        let calls = Cell::new(0u32);
        let started = Instant::now();
        let found: Option<()> = wait_for(
            || {
                calls.set(calls.get() + 1);
                None
            },
            timeout,
            interval,
        )
        .await;
        let elapsed = started.elapsed();

        assert!(found.is_none());
        assert!(calls.get() >= 1, "predicate runs at least once");
        assert!(elapsed >= timeout, "{timeout:?}/{interval:?} returned early: {elapsed:?}");
        assert!(
            elapsed <= timeout + interval.max(Duration::from_millis(1)),
            "{timeout:?}/{interval:?} overran: {elapsed:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_on_a_later_poll() {
    let started = Instant::now();
    let found = wait_for(
        || (started.elapsed() >= Duration::from_millis(250)).then_some("ready"),
        Duration::from_secs(1),
        Duration::from_millis(100),
    )
    .await;
    assert_eq!(found, Some("ready"));
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_predicate_errors_count_as_not_yet() {
    let calls = Cell::new(0u32);
    let found = wait_for_condition(
        || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("node detached")
            } else {
                Ok(Some(calls.get()))
            }
        },
        Duration::from_secs(1),
        Duration::from_millis(10),
    )
    .await;
    assert_eq!(found, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_persistent_errors_resolve_to_none() {
    let found: Option<()> = wait_for_condition(
        || Err::<Option<()>, _>("always broken"),
        Duration::from_millis(200),
        Duration::from_millis(20),
    )
    .await;
    assert!(found.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_timeout_still_returns() {
    let started = Instant::now();
    assert_eq!(
        wait_for(|| Some(1), Duration::MAX, Duration::from_millis(10)).await,
        Some(1)
    );
    assert_eq!(started.elapsed(), Duration::ZERO);

    let found = wait_for(
        || (started.elapsed() >= Duration::from_millis(35)).then_some("late"),
        Duration::from_millis(u64::MAX),
        Duration::from_millis(10),
    )
    .await;
    assert_eq!(found, Some("late"));
    assert_eq!(started.elapsed(), Duration::from_millis(40));
}

#[tokio::test(start_paused = true)]
async fn test_huge_interval_is_clipped_to_the_timeout() {
    let started = Instant::now();
    let found: Option<()> = wait_for(|| None, Duration::from_millis(50), Duration::MAX).await;
    assert!(found.is_none());
    assert_eq!(started.elapsed(), Duration::from_millis(50));
}
