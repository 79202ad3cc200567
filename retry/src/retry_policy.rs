//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use std::iter::Iterator;
use std::time::{Duration, Instant};

/// The retry policy that can retry something with
/// backoff policy.
pub trait BackoffSchedule: Iterator<Item = Duration> {}

/// Any implementation which implements the Iterator trait would also implement BackoffSchedule.
impl<T> BackoffSchedule for T where T: Iterator<Item = Duration> {}

/// The retry policy that can retry something with
/// exp backoff policy.
///
/// The policy is `Copy` and every copied value is a freshly reset schedule:
/// the elapsed-time deadline is armed on the first call to `next`, not when
/// the policy is constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryWithBackoff {
    attempt: usize,

    initial_delay: Duration,
    backoff_coefficient: u32,
    max_attempt: Option<usize>,
    max_delay: Option<Duration>,
    max_elapsed: Option<Duration>,
    deadline: Option<Instant>,
}

impl Default for RetryWithBackoff {
    /// Constructs a new exponential back-off strategy,
    /// using default setting.
    fn default() -> RetryWithBackoff {
        RetryWithBackoff {
            attempt: 0,

            initial_delay: Duration::from_millis(10),
            backoff_coefficient: 2,
            max_attempt: None,
            max_delay: Some(Duration::from_millis(10000)),
            max_elapsed: Some(Duration::from_millis(30000)),
            deadline: None,
        }
    }
}

impl RetryWithBackoff {
    /// A schedule that yields no delays: the operation is attempted
    /// exactly once.
    pub fn no_retry() -> RetryWithBackoff {
        RetryWithBackoff::default().max_attempt(0)
    }

    /// Apply a initial delay.
    pub fn initial_delay(mut self, initial_delay: Duration) -> RetryWithBackoff {
        self.initial_delay = initial_delay;
        self
    }

    /// Apply a backoff coefficient.
    pub fn backoff_coefficient(mut self, backoff_coefficient: u32) -> RetryWithBackoff {
        self.backoff_coefficient = backoff_coefficient;
        self
    }

    /// Apply a maximum attempt. No retry attempt will be larger than this `usize`.
    pub fn max_attempt(mut self, attempt: usize) -> RetryWithBackoff {
        self.max_attempt = Some(attempt);
        self
    }

    /// Apply a maximum delay. No retry delay will be longer than this `Duration`.
    pub fn max_delay(mut self, duration: Duration) -> RetryWithBackoff {
        self.max_delay = Some(duration);
        self
    }

    /// Apply a maximum elapsed time. Once the schedule has been running for
    /// this long no further delays are yielded.
    pub fn max_elapsed(mut self, duration: Duration) -> RetryWithBackoff {
        self.max_elapsed = Some(duration);
        self
    }

    /// Remove the elapsed-time bound. The schedule yields delays forever.
    pub fn unbounded_elapsed(mut self) -> RetryWithBackoff {
        self.max_elapsed = None;
        self
    }
}

impl Iterator for RetryWithBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let deadline = match self.deadline {
            Some(deadline) => Some(deadline),
            None => self.max_elapsed.map(|max| {
                let deadline = now + max;
                self.deadline = Some(deadline);
                deadline
            }),
        };
        if let Some(deadline) = deadline {
            if deadline <= now {
                return None;
            }
        }
        if let Some(max_attempt) = self.max_attempt {
            if self.attempt >= max_attempt {
                return None;
            }
        }

        self.attempt += 1;
        let coefficient = self.backoff_coefficient.checked_pow((self.attempt - 1) as u32);
        let delay = coefficient.and_then(|coefficient| self.initial_delay.checked_mul(coefficient));

        if delay.is_some() && self.max_delay.is_some() {
            if delay < self.max_delay {
                delay
            } else {
                self.max_delay
            }
        } else {
            delay.or(self.max_delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_uses_default_setting() {
        let mut s = RetryWithBackoff::default();

        assert_eq!(s.next(), Some(Duration::from_millis(10)));
        assert_eq!(s.next(), Some(Duration::from_millis(20)));
        assert_eq!(s.next(), Some(Duration::from_millis(40)));
        assert_eq!(s.next(), Some(Duration::from_millis(80)));
    }

    #[test]
    fn test_returns_some_exponential_base_2() {
        let mut s = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(2))
            .backoff_coefficient(2);

        assert_eq!(s.next(), Some(Duration::from_millis(2)));
        assert_eq!(s.next(), Some(Duration::from_millis(4)));
        assert_eq!(s.next(), Some(Duration::from_millis(8)));
    }

    #[test]
    fn test_returns_with_finite_retries() {
        let mut s = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(10))
            .max_attempt(3);
        assert_eq!(s.next(), Some(Duration::from_millis(10)));
        assert_eq!(s.next(), Some(Duration::from_millis(20)));
        assert_eq!(s.next(), Some(Duration::from_millis(40)));
        assert_eq!(s.next(), None);
    }

    #[test]
    fn test_no_retry_yields_nothing() {
        let mut s = RetryWithBackoff::no_retry();
        assert_eq!(s.next(), None);
    }

    #[test]
    fn stops_increasing_at_max_delay() {
        let mut s = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(2))
            .max_delay(Duration::from_millis(4));

        assert_eq!(s.next(), Some(Duration::from_millis(2)));
        assert_eq!(s.next(), Some(Duration::from_millis(4)));
        assert_eq!(s.next(), Some(Duration::from_millis(4)));
    }

    #[test]
    fn returns_max_when_max_less_than_base() {
        let mut s = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(10));
        assert_eq!(s.next(), Some(Duration::from_millis(10)));
        assert_eq!(s.next(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn delays_are_non_decreasing() {
        let mut s = RetryWithBackoff::default().unbounded_elapsed();
        let mut previous = Duration::ZERO;
        for _ in 0..16 {
            let delay = s.next().expect("schedule is unbounded");
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(10000));
            previous = delay;
        }
    }

    #[test]
    fn test_stops_at_max_elapsed() {
        let sleep_duration = Duration::from_millis(10);
        let mut s = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(1))
            .max_elapsed(sleep_duration);

        assert_eq!(s.next(), Some(Duration::from_millis(1)));
        assert_eq!(s.next(), Some(Duration::from_millis(2)));

        thread::sleep(sleep_duration);

        assert_eq!(s.next(), None);
    }

    #[test]
    fn test_deadline_armed_on_first_next() {
        let s = RetryWithBackoff::default().max_elapsed(Duration::from_millis(10));

        // the policy value itself carries no armed deadline
        thread::sleep(Duration::from_millis(20));

        let mut fresh = s;
        assert_eq!(fresh.next(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_copy_resets_schedule() {
        let template = RetryWithBackoff::default()
            .initial_delay(Duration::from_millis(1))
            .backoff_coefficient(2)
            .max_elapsed(Duration::from_millis(200));

        let mut first = template;
        assert_eq!(first.next(), Some(Duration::from_millis(1)));
        assert_eq!(first.next(), Some(Duration::from_millis(2)));

        let mut second = template;
        assert_eq!(second.next(), Some(Duration::from_millis(1)));
    }
}
