//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use super::retry_policy::BackoffSchedule;
use super::retry_result::RetryError;
use super::retry_result::RetryResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry the given operation asynchronously until it succeeds,
/// or until the given Duration iterator ends.
/// It can be used as follows:
/// let retry_policy = RetryWithBackoff::default();
/// let future = retry_async(retry_policy, || async {
///     let previous = 1;
///     match previous {
///         1 => RetryResult::Fail("not retry"),
///         2 => RetryResult::Success(previous),
///         _ => RetryResult::Retry("retry"),
///     }
/// });
pub async fn retry_async<F, T, E>(
    retry_schedule: impl BackoffSchedule,
    operation: impl FnMut() -> F,
) -> Result<T, RetryError<E>>
where
    F: Future<Output = RetryResult<T, E>>,
{
    retry_notify_async(retry_schedule, operation, |_, _| {}).await
}

/// Same as [`retry_async`], but invokes `notify` with the error and the
/// upcoming delay before every backoff sleep. The callback must not block.
pub async fn retry_notify_async<F, T, E>(
    retry_schedule: impl BackoffSchedule,
    mut operation: impl FnMut() -> F,
    mut notify: impl FnMut(&E, Duration),
) -> Result<T, RetryError<E>>
where
    F: Future<Output = RetryResult<T, E>>,
{
    let mut iterator = retry_schedule;
    let mut current_try = 1;
    let mut total_delay = Duration::default();
    loop {
        let result: RetryResult<T, E> = operation().await;

        match result {
            RetryResult::Success(value) => return Ok(value),
            RetryResult::Retry(error) => {
                if let Some(delay) = iterator.next() {
                    notify(&error, delay);
                    sleep(delay).await;
                    current_try += 1;
                    total_delay += delay;
                } else {
                    return Err(RetryError {
                        error,
                        total_delay,
                        tries: current_try,
                    });
                }
            }
            RetryResult::Fail(error) => {
                return Err(RetryError {
                    error,
                    total_delay,
                    tries: current_try,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::retry_policy::RetryWithBackoff;
    use super::retry_async;
    use super::retry_notify_async;
    use super::RetryError;
    use super::RetryResult;
    use snafu::Snafu;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    #[derive(Debug, PartialEq, Eq, Snafu)]
    pub enum SnafuError {
        #[snafu(display("Retryable error"))]
        Retryable,
        #[snafu(display("NonRetryable error"))]
        Nonretryable,
    }

    fn quick_policy() -> RetryWithBackoff {
        RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
    }

    #[test]
    fn attempts_just_once() {
        let runtime = Runtime::new().unwrap();
        let retry_policy = quick_policy().max_attempt(0);
        let future = retry_async(retry_policy, || async {
            let previous = 1;
            match previous {
                1 => RetryResult::Fail(SnafuError::Nonretryable),
                2 => RetryResult::Success(previous),
                _ => RetryResult::Retry(SnafuError::Retryable),
            }
        });
        let res = runtime.block_on(future);
        assert_eq!(
            res,
            Err(RetryError {
                error: SnafuError::Nonretryable,
                tries: 1,
                total_delay: Duration::from_millis(0),
            })
        );
    }

    #[test]
    fn attempts_until_max_retries_exceeded() {
        let runtime = Runtime::new().unwrap();
        let retry_policy = quick_policy().max_attempt(3);
        let future = retry_async(retry_policy, || async {
            let previous = 3;
            match previous {
                1 => RetryResult::Fail(SnafuError::Nonretryable),
                2 => RetryResult::Success(previous),
                _ => RetryResult::Retry(SnafuError::Retryable),
            }
        });

        let res = runtime.block_on(future);
        assert_eq!(res.err().unwrap().tries, 4);
    }

    #[test]
    fn attempts_until_success() {
        let runtime = Runtime::new().unwrap();
        let retry_policy = quick_policy().max_attempt(3);
        let mut counter = 0;

        let future = retry_async(retry_policy, || {
            let previous = counter;
            counter += 1;
            async move {
                if previous < 3 {
                    RetryResult::Retry(SnafuError::Retryable)
                } else {
                    RetryResult::Success(previous)
                }
            }
        });
        let res = runtime.block_on(future);
        assert_eq!(res, Ok(3));
        assert_eq!(counter, 4);
    }

    #[test]
    fn notify_fires_before_every_sleep() {
        let runtime = Runtime::new().unwrap();
        let retry_policy = quick_policy().max_attempt(5);
        let mut counter = 0;
        let mut notified = Vec::new();

        let future = retry_notify_async(
            retry_policy,
            || {
                let previous = counter;
                counter += 1;
                async move {
                    if previous < 2 {
                        RetryResult::Retry(SnafuError::Retryable)
                    } else {
                        RetryResult::Success(previous)
                    }
                }
            },
            |err: &SnafuError, delay| {
                assert_eq!(err, &SnafuError::Retryable);
                notified.push(delay);
            },
        );
        let res = runtime.block_on(future);
        assert_eq!(res, Ok(2));
        assert_eq!(
            notified,
            vec![Duration::from_millis(1), Duration::from_millis(2)]
        );
    }

    #[test]
    fn elapsed_time_is_bounded() {
        let runtime = Runtime::new().unwrap();
        let retry_policy = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(20))
            .max_elapsed(Duration::from_millis(100));
        let started = std::time::Instant::now();

        let future = retry_async(retry_policy, || async {
            RetryResult::Retry::<(), SnafuError>(SnafuError::Retryable)
        });
        let res = runtime.block_on(future);

        assert_eq!(res.err().unwrap().error, SnafuError::Retryable);
        // max elapsed plus at most one last attempt and one last sleep
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
