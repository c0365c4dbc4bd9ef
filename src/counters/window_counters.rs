use std::sync::{Arc, Mutex};

use super::Counter;
use crate::clock::{Clock, SystemClock};
use crate::event::{Event, Listener, Property};
use crate::value::CounterValue;
use crate::window::SampleWindow;

/// The mean of `value` events observed within the trailing `window_secs`
/// seconds; `null` once the window is empty (§4.2, §9 open question 3).
///
/// Grounded on `original_source/src/pycounters/counters.py`'s
/// `AverageWindowCounter`.
pub struct AverageWindowCounter {
    name: String,
    window: Mutex<SampleWindow>,
}

impl AverageWindowCounter {
    /// A counter over the trailing `window_secs` seconds, using the system clock.
    pub fn new(name: impl Into<String>, window_secs: f64) -> Self {
        Self::with_clock(name, window_secs, Arc::new(SystemClock))
    }

    /// As [`Self::new`], but reading time from `clock` (for tests, §10.4).
    pub fn with_clock(name: impl Into<String>, window_secs: f64, clock: Arc<dyn Clock>) -> Self {
        AverageWindowCounter {
            name: name.into(),
            window: Mutex::new(SampleWindow::new(clock, window_secs)),
        }
    }
}

impl Listener for AverageWindowCounter {
    fn report_event(&self, event: &Event) {
        if let Property::Value(v) = event.property {
            self.window.lock().unwrap().push(v);
        }
    }
}

impl Counter for AverageWindowCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_value(&self) -> CounterValue {
        let mut window = self.window.lock().unwrap();
        let (sum, count) = window
            .values()
            .fold((0.0, 0.0), |(s, c), v| (s + v, c + 1.0));
        if count == 0.0 {
            CounterValue::Average(vec![])
        } else {
            CounterValue::Average(vec![(sum / count, count)])
        }
    }

    fn clear(&self) {
        self.window.lock().unwrap().clear();
    }
}

/// The maximum `value` observed within the trailing window (§4.2).
pub struct MaxWindowCounter {
    name: String,
    window: Mutex<SampleWindow>,
}

impl MaxWindowCounter {
    /// A counter over the trailing `window_secs` seconds, using the system clock.
    pub fn new(name: impl Into<String>, window_secs: f64) -> Self {
        Self::with_clock(name, window_secs, Arc::new(SystemClock))
    }

    /// As [`Self::new`], but reading time from `clock`.
    pub fn with_clock(name: impl Into<String>, window_secs: f64, clock: Arc<dyn Clock>) -> Self {
        MaxWindowCounter {
            name: name.into(),
            window: Mutex::new(SampleWindow::new(clock, window_secs)),
        }
    }
}

impl Listener for MaxWindowCounter {
    fn report_event(&self, event: &Event) {
        if let Property::Value(v) = event.property {
            self.window.lock().unwrap().push(v);
        }
    }
}

impl Counter for MaxWindowCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_value(&self) -> CounterValue {
        let mut window = self.window.lock().unwrap();
        CounterValue::Max(window.values().fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) => Some(m.max(v)),
        }))
    }

    fn clear(&self) {
        self.window.lock().unwrap().clear();
    }
}

/// The minimum `value` observed within the trailing window (§4.2).
pub struct MinWindowCounter {
    name: String,
    window: Mutex<SampleWindow>,
}

impl MinWindowCounter {
    /// A counter over the trailing `window_secs` seconds, using the system clock.
    pub fn new(name: impl Into<String>, window_secs: f64) -> Self {
        Self::with_clock(name, window_secs, Arc::new(SystemClock))
    }

    /// As [`Self::new`], but reading time from `clock`.
    pub fn with_clock(name: impl Into<String>, window_secs: f64, clock: Arc<dyn Clock>) -> Self {
        MinWindowCounter {
            name: name.into(),
            window: Mutex::new(SampleWindow::new(clock, window_secs)),
        }
    }
}

impl Listener for MinWindowCounter {
    fn report_event(&self, event: &Event) {
        if let Property::Value(v) = event.property {
            self.window.lock().unwrap().push(v);
        }
    }
}

impl Counter for MinWindowCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_value(&self) -> CounterValue {
        let mut window = self.window.lock().unwrap();
        CounterValue::Min(window.values().fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) => Some(m.min(v)),
        }))
    }

    fn clear(&self) {
        self.window.lock().unwrap().clear();
    }
}

/// `count / (now - oldest_timestamp)` over the trailing window; `null` with
/// fewer than two samples (§4.2, S3).
///
/// Every `end` is a trigger: it is recorded as an occurrence timestamp the
/// same way [`super::EventCounter`] treats `end` as `value = 1`, reusing the
/// window machinery `AverageWindowCounter` uses (grounded on
/// `original_source/src/pycounters/counters.py`'s
/// `FrequencyCounter(TriggerMixin, AverageWindowCounter)`).
pub struct FrequencyCounter {
    name: String,
    window: Mutex<SampleWindow>,
}

impl FrequencyCounter {
    /// A counter over the trailing `window_secs` seconds, using the system clock.
    pub fn new(name: impl Into<String>, window_secs: f64) -> Self {
        Self::with_clock(name, window_secs, Arc::new(SystemClock))
    }

    /// As [`Self::new`], but reading time from `clock` (S3 uses this).
    pub fn with_clock(name: impl Into<String>, window_secs: f64, clock: Arc<dyn Clock>) -> Self {
        FrequencyCounter {
            name: name.into(),
            window: Mutex::new(SampleWindow::new(clock, window_secs)),
        }
    }
}

impl Listener for FrequencyCounter {
    fn report_event(&self, event: &Event) {
        match event.property {
            Property::End => self.window.lock().unwrap().push(1.0),
            Property::Value(v) => self.window.lock().unwrap().push(v),
            Property::Start => {}
        }
    }
}

impl Counter for FrequencyCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_value(&self) -> CounterValue {
        let mut window = self.window.lock().unwrap();
        let now = window.now();
        let timestamps: Vec<f64> = window.timestamps().collect();
        if timestamps.len() < 2 {
            return CounterValue::Average(vec![]);
        }
        let oldest = timestamps[0];
        let span = now - oldest;
        if span <= 0.0 {
            CounterValue::Average(vec![])
        } else {
            CounterValue::Average(vec![(timestamps.len() as f64 / span, 1.0)])
        }
    }

    fn clear(&self) {
        self.window.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StepClock;

    #[test]
    fn average_window_reports_mean_then_empties() {
        let clock = Arc::new(StepClock::new(0.1));
        let c = AverageWindowCounter::with_clock("c", 0.5, clock);
        c.report_event(&Event::value("c", 1.0));
        c.report_event(&Event::value("c", 2.0));
        assert_eq!(c.get_value().value(), Some(1.5));
    }

    #[test]
    fn max_and_min_window_track_extremes() {
        let clock = Arc::new(StepClock::new(0.01));
        let max = MaxWindowCounter::with_clock("m", 10.0, clock.clone());
        let min = MinWindowCounter::with_clock("m", 10.0, clock);
        for v in [3.0, 1.0, 9.0, 4.0] {
            max.report_event(&Event::value("m", v));
            min.report_event(&Event::value("m", v));
        }
        assert_eq!(max.get_value().value(), Some(9.0));
        assert_eq!(min.get_value().value(), Some(1.0));
    }

    #[test]
    fn frequency_needs_at_least_two_samples() {
        let clock = Arc::new(StepClock::new(1.0));
        let f = FrequencyCounter::with_clock("f", 10.0, clock);
        assert_eq!(f.get_value().value(), None);
        f.report_event(&Event::end("f"));
        assert_eq!(f.get_value().value(), None);
        f.report_event(&Event::end("f"));
        // two events recorded with the step clock advancing by 1 each read
        assert!(f.get_value().value().unwrap() > 0.0);
    }
}
