//! Bounded, fixed-cadence polling.
//!
//! Telemetry in the cluster is eventually consistent: collectors poll their sources on a
//! fixed interval, so nearly every observation has to be retried until it converges.
//! [`retry`] re-invokes an operation on a fixed cadence until it produces an acceptable
//! value, the error predicate declares a failure terminal, or the deadline passes.

mod clock;
mod policy;

pub use clock::{Clock, SystemClock};
pub use policy::{Attempt, RetryPolicy};

#[cfg(any(test, feature = "test-harness"))]
pub use clock::ManualClock;

use std::fmt;
use std::time::Duration;

/// Why [`retry`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error predicate refused the failure; no further attempts were made.
    Aborted { attempts: u32, source: E },
    /// The deadline passed and the last attempt failed with `source`.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        deadline: Duration,
        source: E,
    },
    /// The deadline passed and the last attempt produced a value the result predicate rejected.
    Rejected {
        attempts: u32,
        elapsed: Duration,
        deadline: Duration,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Aborted { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Rejected { attempts, .. } => *attempts,
        }
    }

    pub fn is_timeout(&self) -> bool {
        !matches!(self, RetryError::Aborted { .. })
    }

    /// The last concrete error, if the final attempt produced one.
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Aborted { source, .. } | RetryError::Exhausted { source, .. } => {
                Some(source)
            }
            RetryError::Rejected { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Aborted { attempts, source } => {
                write!(f, "non-retryable failure on attempt {attempts}: {source}")
            }
            RetryError::Exhausted {
                attempts,
                elapsed,
                deadline,
                source,
            } => write!(
                f,
                "deadline {deadline:?} exceeded after {attempts} attempts ({elapsed:?}): {source}"
            ),
            RetryError::Rejected {
                attempts,
                elapsed,
                deadline,
            } => write!(
                f,
                "deadline {deadline:?} exceeded after {attempts} attempts ({elapsed:?}) without an acceptable result"
            ),
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Aborted { source, .. } | RetryError::Exhausted { source, .. } => {
                Some(source)
            }
            RetryError::Rejected { .. } => None,
        }
    }
}

/// Runs `operation` under `policy` on the system clock.
pub fn retry<R, E, F>(policy: &RetryPolicy<R, E>, operation: F) -> Result<R, RetryError<E>>
where
    F: FnMut() -> Result<R, E>,
{
    retry_with_clock(policy, &SystemClock, operation)
}

/// Runs `operation` under `policy`, reading time from `clock`.
///
/// The first attempt always happens. After every retryable outcome the elapsed time since
/// the first attempt is compared against the deadline; the loop sleeps for the policy's
/// interval only when budget remains.
pub fn retry_with_clock<R, E, F, C>(
    policy: &RetryPolicy<R, E>,
    clock: &C,
    mut operation: F,
) -> Result<R, RetryError<E>>
where
    F: FnMut() -> Result<R, E>,
    C: Clock + ?Sized,
{
    let started = clock.now();
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        let last_error = match policy.classify(operation()) {
            Attempt::Success(value) => return Ok(value),
            Attempt::Terminal(source) => return Err(RetryError::Aborted { attempts, source }),
            Attempt::Retryable(source) => Some(source),
            Attempt::Rejected(_) => None,
        };

        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed >= policy.deadline() {
            let deadline = policy.deadline();
            return Err(match last_error {
                Some(source) => RetryError::Exhausted {
                    attempts,
                    elapsed,
                    deadline,
                    source,
                },
                None => RetryError::Rejected {
                    attempts,
                    elapsed,
                    deadline,
                },
            });
        }

        clock.sleep(policy.interval());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_immediate_success_makes_one_call() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);
        let policy: RetryPolicy<&str, String> = RetryPolicy::fixed(secs(2), secs(300));

        let value = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            Ok("ready")
        })
        .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(calls.get(), 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_eventual_success_within_deadline() {
        let clock = ManualClock::new();
        let calls = Cell::new(0u32);
        let failures = 3;
        let policy: RetryPolicy<u32, String> = RetryPolicy::fixed(secs(1), secs(10));

        let value = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            if calls.get() <= failures {
                Err(format!("attempt {} not ready", calls.get()))
            } else {
                Ok(calls.get())
            }
        })
        .unwrap();

        assert_eq!(value, failures + 1);
        assert_eq!(calls.get(), failures + 1);
        assert_eq!(clock.sleeps(), failures);
        assert_eq!(clock.elapsed(), secs(3));
    }

    #[test]
    fn test_deadline_exhaustion_returns_last_error() {
        let clock = ManualClock::new();
        let calls = Cell::new(0u32);
        let policy: RetryPolicy<(), String> = RetryPolicy::fixed(secs(10), secs(30));

        let err = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            Err::<(), _>(format!("failure #{}", calls.get()))
        })
        .unwrap_err();

        // Attempts at t=0, 10, 20, 30; the check at t=30 ends the loop
        assert_eq!(calls.get(), 4);
        assert_eq!(err.attempts(), 4);
        assert!(err.is_timeout());
        match err {
            RetryError::Exhausted {
                elapsed,
                deadline,
                source,
                ..
            } => {
                assert!(elapsed >= deadline);
                assert_eq!(source, "failure #4");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_results_synthesize_timeout() {
        let clock = ManualClock::new();
        let policy: RetryPolicy<u16, String> =
            RetryPolicy::fixed(secs(2), secs(10)).retry_on_result(|status| *status == 204);

        let err = retry_with_clock(&policy, &clock, || Ok(204)).unwrap_err();

        assert!(matches!(err, RetryError::Rejected { attempts: 6, .. }));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("without an acceptable result"));
        assert!(err.into_source().is_none());
    }

    #[test]
    fn test_terminal_error_short_circuits() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);
        let policy: RetryPolicy<(), std::io::Error> =
            RetryPolicy::fixed(secs(1), secs(3600)).retry_on_error(|e: &std::io::Error| {
                e.kind() != std::io::ErrorKind::PermissionDenied
            });

        let err = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"))
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "forbidden",
                ))
            }
        })
        .unwrap_err();

        assert_eq!(calls.get(), 3);
        assert!(!err.is_timeout());
        let source = err.into_source().unwrap();
        assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
        assert!(clock.elapsed() < secs(3600));
    }

    #[test]
    fn test_never_retry_errors_fails_on_first_error() {
        let clock = ManualClock::new();
        let policy: RetryPolicy<u16, &str> = RetryPolicy::fixed(secs(2), secs(300))
            .retry_on_result(|status| *status == 204)
            .never_retry_errors();

        let err = retry_with_clock(&policy, &clock, || Err("connection refused")).unwrap_err();
        assert!(matches!(
            err,
            RetryError::Aborted {
                attempts: 1,
                source: "connection refused"
            }
        ));
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_zero_interval_terminates_on_advancing_clock() {
        let clock = ManualClock::with_tick(Duration::from_millis(1));
        let calls = Cell::new(0u32);
        let policy: RetryPolicy<(), &str> = RetryPolicy::tight(Duration::from_millis(10));

        let err = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            Err("not yet")
        })
        .unwrap_err();

        assert_eq!(calls.get(), 10);
        assert_eq!(err.attempts(), 10);
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_zero_deadline_still_attempts_once() {
        let clock = ManualClock::new();
        let calls = Cell::new(0);
        let policy: RetryPolicy<(), &str> = RetryPolicy::fixed(secs(5), Duration::ZERO);

        let err = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            Err("down")
        })
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, RetryError::Exhausted { attempts: 1, .. }));
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_last_outcome_decides_error_kind() {
        // An error followed by rejected values ends as a rejection
        let clock = ManualClock::new();
        let calls = Cell::new(0);
        let policy: RetryPolicy<bool, &str> =
            RetryPolicy::fixed(secs(1), secs(2)).retry_on_result(|ok| !ok);

        let err = retry_with_clock(&policy, &clock, || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err("flaky")
            } else {
                Ok(false)
            }
        })
        .unwrap_err();

        assert!(matches!(err, RetryError::Rejected { attempts: 3, .. }));
    }

    #[test]
    fn test_nested_retries_are_independent() {
        let clock = ManualClock::new();
        let outer_calls = Cell::new(0u32);
        let inner_calls = Cell::new(0u32);
        let outer: RetryPolicy<u32, String> = RetryPolicy::fixed(secs(5), secs(60));
        let inner: RetryPolicy<u32, String> =
            RetryPolicy::fixed(Duration::from_millis(500), secs(1));

        let value = retry_with_clock(&outer, &clock, || {
            outer_calls.set(outer_calls.get() + 1);
            let round = outer_calls.get();
            retry_with_clock(&inner, &clock, || {
                inner_calls.set(inner_calls.get() + 1);
                if round < 3 {
                    Err(format!("round {round} not converged"))
                } else {
                    Ok(round)
                }
            })
            .map_err(|e| e.to_string())
        })
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(outer_calls.get(), 3);
        // Two exhausted inner loops of three attempts each, then one success
        assert_eq!(inner_calls.get(), 7);
    }

    #[test]
    fn test_retry_on_system_clock() {
        let calls = Cell::new(0);
        let policy: RetryPolicy<(), &str> =
            RetryPolicy::fixed(Duration::from_millis(1), Duration::from_millis(20));

        let result = retry(&policy, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("warming up")
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_error_display_includes_last_error() {
        let err: RetryError<String> = RetryError::Exhausted {
            attempts: 4,
            elapsed: secs(31),
            deadline: secs(30),
            source: "status 503".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("4 attempts"));
        assert!(text.contains("status 503"));
    }
}
