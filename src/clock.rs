//! An injectable clock so window counters and timers (§4.2) can be tested
//! without sleeping, the idiomatic-Rust stand-in for the `FakeTimer`/
//! `FakeThreadLocalTimer` stub clocks in `original_source/tests/counter_tests.py`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A monotonic-enough source of "now", abstracted so tests can step it
/// deterministically instead of sleeping (S2-S4 in the spec).
pub trait Clock: Send + Sync + 'static {
    /// Seconds since an arbitrary epoch. Only differences between calls are
    /// meaningful to callers.
    fn now_secs(&self) -> f64;
}

/// The default clock, backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }
}

#[cfg(test)]
pub use test_support::StepClock;

#[cfg(test)]
mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A clock that advances by a fixed step every time it is read, mirroring
    /// `FakeTimer`/`FakeThreadLocalTimer` in the original Python test suite.
    #[derive(Debug)]
    pub struct StepClock {
        bits: AtomicU64,
        step: f64,
    }

    impl StepClock {
        /// A clock starting at `0.0` and advancing by `step` on each read.
        pub fn new(step: f64) -> Self {
            StepClock {
                bits: AtomicU64::new(0f64.to_bits()),
                step,
            }
        }
    }

    impl Clock for StepClock {
        fn now_secs(&self) -> f64 {
            let step = self.step;
            let mut cur = f64::from_bits(self.bits.load(Ordering::SeqCst));
            loop {
                let next = cur + step;
                match self.bits.compare_exchange_weak(
                    cur.to_bits(),
                    next.to_bits(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => return cur,
                    Err(actual) => cur = f64::from_bits(actual),
                }
            }
        }
    }
}
