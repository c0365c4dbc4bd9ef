use std::sync::Mutex;

use super::Counter;
use crate::event::{Event, Listener, Property};
use crate::value::CounterValue;

/// Sums every `value` event it sees; `start`/`end` are ignored. Unlike
/// [`super::EventCounter`], an untouched `TotalCounter` reports `null`
/// rather than `0.0` (§4.2 table: "running sum S (or null if none)").
pub struct TotalCounter {
    name: String,
    events: Vec<String>,
    sum: Mutex<Option<f64>>,
}

impl TotalCounter {
    /// A new counter named `name`, reporting `null` until its first value.
    /// Subscribes only to events named `name` (§4.3 "single name" default).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        TotalCounter {
            events: vec![name.clone()],
            name,
            sum: Mutex::new(None),
        }
    }

    /// A counter named `name` that fans in values reported under any of
    /// `events` instead of just its own name (§4.3 "a counter may subscribe
    /// to multiple names"), e.g. `TotalCounter::with_events("test", ["test1", "test2"])`.
    pub fn with_events(name: impl Into<String>, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        TotalCounter {
            name: name.into(),
            events: events.into_iter().map(Into::into).collect(),
            sum: Mutex::new(None),
        }
    }
}

impl Listener for TotalCounter {
    fn report_event(&self, event: &Event) {
        if let Property::Value(v) = event.property {
            let mut sum = self.sum.lock().unwrap();
            *sum = Some(sum.unwrap_or(0.0) + v);
        }
    }
}

impl Counter for TotalCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn events(&self) -> Vec<String> {
        self.events.clone()
    }

    fn get_value(&self) -> CounterValue {
        CounterValue::Accumulative(*self.sum.lock().unwrap())
    }

    fn clear(&self) {
        *self.sum.lock().unwrap() = None;
    }
}
