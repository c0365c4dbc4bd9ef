use std::sync::Mutex;

use super::Counter;
use crate::event::{Event, Listener, Property};
use crate::value::CounterValue;

/// Counts occurrences: an `end` is treated as `value = 1` (the trigger
/// mixin), and bare `value` events add directly to the running sum.
///
/// Grounded on `original_source/src/pycounters/counters.py`'s `EventCounter`
/// (`TriggerMixin, BaseCounter`).
pub struct EventCounter {
    name: String,
    sum: Mutex<f64>,
}

impl EventCounter {
    /// A new, zeroed counter named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        EventCounter {
            name: name.into(),
            sum: Mutex::new(0.0),
        }
    }

    fn add(&self, v: f64) {
        *self.sum.lock().unwrap() += v;
    }
}

impl Listener for EventCounter {
    fn report_event(&self, event: &Event) {
        match event.property {
            Property::Start => {}
            Property::End => self.add(1.0),
            Property::Value(v) => self.add(v),
        }
    }
}

impl Counter for EventCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_value(&self) -> CounterValue {
        CounterValue::Accumulative(Some(*self.sum.lock().unwrap()))
    }

    fn clear(&self) {
        *self.sum.lock().unwrap() = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_three_calls_then_clears() {
        let c = EventCounter::new("c");
        for _ in 0..3 {
            c.report_event(&Event::end("c"));
        }
        assert_eq!(c.get_value().value(), Some(3.0));

        c.clear();
        assert_eq!(c.get_value().value(), Some(0.0));

        c.report_event(&Event::end("c"));
        assert_eq!(c.get_value().value(), Some(1.0));
    }

    #[test]
    fn start_events_are_ignored() {
        let c = EventCounter::new("c");
        c.report_event(&Event::start("c"));
        assert_eq!(c.get_value().value(), Some(0.0));
    }
}
