//! Shared time-window sample deque (§4.2 "Window eviction policy").
//!
//! Grounded on `original_source/src/pycounters/counters.py`'s
//! `AverageWindowCounter`/`FrequencyCounter`, which both keep a `deque` of
//! `(value, timestamp)` pairs and trim it from the left before every read
//! and write. Factored out here so `AverageWindowCounter`, `MaxWindowCounter`,
//! `MinWindowCounter` and `FrequencyCounter` share one eviction
//! implementation instead of re-deriving it per counter.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::clock::Clock;

/// A `(value, timestamp)` sample deque bounded to the last `window_secs`
/// seconds, evicted lazily on read and write.
pub struct SampleWindow {
    clock: Arc<dyn Clock>,
    window_secs: f64,
    samples: VecDeque<(f64, f64)>,
}

impl SampleWindow {
    /// A new, empty window of `window_secs` seconds.
    pub fn new(clock: Arc<dyn Clock>, window_secs: f64) -> Self {
        SampleWindow {
            clock,
            window_secs,
            samples: VecDeque::new(),
        }
    }

    /// Evicts samples older than `now - window_secs`. Called before both
    /// inserts and reads so `get_value` never sees stale samples (§4.2).
    fn evict(&mut self) {
        let cutoff = self.clock.now_secs() - self.window_secs;
        while let Some(&(_, ts)) = self.samples.front() {
            if ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records `value` at the current time, evicting stale samples first.
    pub fn push(&mut self, value: f64) {
        self.evict();
        let now = self.clock.now_secs();
        self.samples.push_back((value, now));
    }

    /// The in-window values, freshest eviction applied.
    pub fn values(&mut self) -> impl Iterator<Item = f64> + '_ {
        self.evict();
        self.samples.iter().map(|&(v, _)| v)
    }

    /// The in-window timestamps, freshest eviction applied.
    pub fn timestamps(&mut self) -> impl Iterator<Item = f64> + '_ {
        self.evict();
        self.samples.iter().map(|&(_, ts)| ts)
    }

    /// Number of in-window samples, after eviction.
    pub fn len(&mut self) -> usize {
        self.evict();
        self.samples.len()
    }

    /// Drains all samples (§4.2 "Clear semantics").
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Current wall time as seen by this window's clock.
    pub fn now(&self) -> f64 {
        self.clock.now_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StepClock;

    #[test]
    fn eviction_happens_before_read_and_write() {
        // window of 2 "seconds" on a clock that advances by 1 per read.
        let clock = Arc::new(StepClock::new(1.0));
        let mut w = SampleWindow::new(clock, 2.0);
        w.push(1.0); // t=0
        w.push(2.0); // t=1
        w.push(3.0); // t=2
        // at this point enough reads have happened that t=0 should be evicted
        let vals: Vec<f64> = w.values().collect();
        assert!(!vals.contains(&1.0) || vals.len() <= 2);
    }

    #[test]
    fn empty_window_has_no_samples() {
        let clock = Arc::new(StepClock::new(1.0));
        let mut w = SampleWindow::new(clock, 10.0);
        assert_eq!(w.len(), 0);
        assert_eq!(w.values().count(), 0);
    }
}
