use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Outcome of a single attempt, as seen by the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<R, E> {
    /// A value the result predicate accepted.
    Success(R),
    /// A value the result predicate asked to retry.
    Rejected(R),
    /// An error the error predicate asked to retry.
    Retryable(E),
    /// An error the error predicate refused; propagated immediately.
    Terminal(E),
}

impl<R, E> Attempt<R, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Attempt::Success(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Attempt::Terminal(_))
    }
}

/// Fixed-cadence, deadline-bounded retry configuration.
///
/// A policy is an immutable value: the combinators consume `self` and hand back a new
/// policy, so one base policy can be specialised per call site without affecting others.
pub struct RetryPolicy<R, E> {
    interval: Duration,
    deadline: Duration,
    retry_on_error: Predicate<E>,
    retry_on_result: Predicate<R>,
}

impl<R, E> RetryPolicy<R, E> {
    /// Attempts spaced `interval` apart until `deadline` has elapsed since the first one.
    pub fn fixed(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            deadline,
            retry_on_error: Arc::new(|_| true),
            retry_on_result: Arc::new(|_| false),
        }
    }

    /// Back-to-back attempts with no pause in between.
    pub fn tight(deadline: Duration) -> Self {
        Self::fixed(Duration::ZERO, deadline)
    }

    pub fn retry_on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_on_error = Arc::new(predicate);
        self
    }

    pub fn retry_on_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.retry_on_result = Arc::new(predicate);
        self
    }

    /// Every error becomes terminal; only rejected results are retried.
    pub fn never_retry_errors(self) -> Self {
        self.retry_on_error(|_| false)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn should_retry_error(&self, error: &E) -> bool {
        (self.retry_on_error)(error)
    }

    pub fn should_retry_result(&self, value: &R) -> bool {
        (self.retry_on_result)(value)
    }

    pub fn classify(&self, outcome: Result<R, E>) -> Attempt<R, E> {
        match outcome {
            Ok(value) if self.should_retry_result(&value) => Attempt::Rejected(value),
            Ok(value) => Attempt::Success(value),
            Err(error) if self.should_retry_error(&error) => Attempt::Retryable(error),
            Err(error) => Attempt::Terminal(error),
        }
    }
}

impl<R, E> Clone for RetryPolicy<R, E> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            deadline: self.deadline,
            retry_on_error: Arc::clone(&self.retry_on_error),
            retry_on_result: Arc::clone(&self.retry_on_result),
        }
    }
}

impl<R, E> fmt::Debug for RetryPolicy<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("interval", &self.interval)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
