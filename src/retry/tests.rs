use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use chrono::{TimeDelta, Utc};
use tokio::time::Instant;

use crate::error::Error;

use super::{classify_remote, RetryPolicy, Transience};

fn transient() -> Error {
    Error::RemoteTransient {
        status: Some(502),
        message: "bad gateway".to_owned(),
    }
}

fn permanent() -> Error {
    Error::RemotePermanent {
        status: 404,
        message: "not found".to_owned(),
    }
}

#[test]
fn backoff_doubles_up_to_max() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(0), Duration::from_secs(2));
    assert_eq!(policy.backoff(1), Duration::from_secs(4));
    assert_eq!(policy.backoff(2), Duration::from_secs(8));
    assert_eq!(policy.backoff(3), Duration::from_secs(10));
    assert_eq!(policy.backoff(40), Duration::from_secs(10));
}

#[test]
fn rate_limit_wait_is_bounded() {
    let policy = RetryPolicy::default();
    let now = Utc::now();

    let soon = now + TimeDelta::try_seconds(5).unwrap();
    assert_eq!(policy.rate_limit_wait(soon, now), Some(Duration::from_secs(5)));

    let past = now - TimeDelta::try_seconds(5).unwrap();
    assert_eq!(policy.rate_limit_wait(past, now), Some(Duration::ZERO));

    let later = now + TimeDelta::try_seconds(61).unwrap();
    assert_eq!(policy.rate_limit_wait(later, now), None);
}

#[test]
fn remote_errors_are_classified() {
    let reset_at = Utc::now();
    assert_eq!(
        classify_remote(&Error::RateLimited { reset_at }),
        Transience::RateLimited { reset_at }
    );
    assert_eq!(classify_remote(&transient()), Transience::Transient);
    assert_eq!(classify_remote(&permanent()), Transience::Permanent);
    assert_eq!(classify_remote(&Error::Cancelled), Transience::Permanent);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);
    let mut retries = vec![];
    let start = Instant::now();

    let result = policy
        .run(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            },
            classify_remote,
            |_, retry, wait| retries.push((retry, wait)),
        )
        .await;

    assert_eq!(result, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        retries,
        vec![(1, Duration::from_secs(2)), (2, Duration::from_secs(4))]
    );
    assert!(start.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn retries_are_exhausted() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = policy
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            classify_remote,
            |_, _, _| {},
        )
        .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.attempts, 4);
    assert_eq!(failure.error, transient());
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let error = failure.into_object_creation_error("a.txt");
    assert!(matches!(
        error,
        Error::ObjectCreation { attempts: 4, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn permanent_failures_are_not_retried() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = policy
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(permanent()) }
            },
            classify_remote,
            |_, _, _| panic!("permanent failure was retried"),
        )
        .await;

    assert_eq!(result.unwrap_err().attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn long_rate_limit_is_abandoned() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);
    let reset_at = Utc::now() + TimeDelta::try_seconds(3600).unwrap();

    let result: Result<(), _> = policy
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(Error::RateLimited { reset_at }) }
            },
            classify_remote,
            |_, _, _| {},
        )
        .await;

    assert_eq!(result.unwrap_err().error, Error::RateLimited { reset_at });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_retries_calls_once() {
    let policy = RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::default()
    };

    let result: Result<(), _> = policy
        .run(|| async { Err(transient()) }, classify_remote, |_, _, _| {})
        .await;

    assert_eq!(result.unwrap_err().attempts, 1);
}
