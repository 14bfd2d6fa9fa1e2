use std::time::{Duration, Instant};

/// Time source used by the retry loop.
///
/// `now` must be monotonic; the loop only ever subtracts an earlier reading from a later one.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock: `Instant::now` and a blocking `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(any(test, feature = "test-harness"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-harness"))]
mod manual {
    use super::Clock;
    use std::cell::Cell;
    use std::time::{Duration, Instant};

    /// Virtual clock for tests. Sleeping advances time instantly; an optional tick
    /// advances it on every `now()` read to model work done between readings.
    #[derive(Debug)]
    pub struct ManualClock {
        origin: Instant,
        offset: Cell<Duration>,
        tick: Duration,
        sleeps: Cell<u32>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self::with_tick(Duration::ZERO)
        }

        pub fn with_tick(tick: Duration) -> Self {
            Self {
                origin: Instant::now(),
                offset: Cell::new(Duration::ZERO),
                tick,
                sleeps: Cell::new(0),
            }
        }

        pub fn advance(&self, by: Duration) {
            self.offset.set(self.offset.get() + by);
        }

        /// Virtual time elapsed since the clock was created.
        pub fn elapsed(&self) -> Duration {
            self.offset.get()
        }

        /// Number of non-zero sleeps requested so far.
        pub fn sleeps(&self) -> u32 {
            self.sleeps.get()
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            let now = self.origin + self.offset.get();
            self.advance(self.tick);
            now
        }

        fn sleep(&self, duration: Duration) {
            if !duration.is_zero() {
                self.sleeps.set(self.sleeps.get() + 1);
                self.advance(duration);
            }
        }
    }
}
