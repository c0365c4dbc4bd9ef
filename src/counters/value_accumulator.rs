use std::collections::HashMap;
use std::sync::Mutex;

use crate::dispatch::GlobalDispatcher;
use crate::event::{Event, Listener, Property};

/// Accumulates every `value` event it sees, keyed by the event's own raw
/// name, into a per-key running sum; periodically re-emits one `value`
/// event per key, named `"<name>.<key>"`, so ordinary counters can
/// subscribe to an individual key without knowing about the accumulator
/// (§4.2 "ValueAccumulator", S5).
///
/// This is not a [`super::Counter`]: its aggregate is a map, not a single
/// [`crate::value::CounterValue`], so it attaches directly to a dispatcher
/// tier as a bare [`Listener`] instead of going through
/// [`crate::registry::Registry`] (grounded on
/// `original_source/src/pycounters/counters.py`'s `ValueAccumulator`, which
/// is itself a `BaseListener` rather than a `BaseCounter`).
///
/// Since it fans in on every value event regardless of name, it would
/// otherwise re-accumulate its own `"<name>.<key>"` output on the next
/// cycle. The guard against that is exactly the one the original source
/// uses: ignore any event whose name already falls under this
/// accumulator's own `"<name>."` namespace, rather than a general
/// reentrancy lock.
pub struct ValueAccumulator {
    name: String,
    prefix: String,
    totals: Mutex<HashMap<String, f64>>,
}

impl ValueAccumulator {
    /// A new accumulator named `name`, fanning in on every `value` event.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = format!("{name}.");
        ValueAccumulator {
            name,
            prefix,
            totals: Mutex::new(HashMap::new()),
        }
    }

    /// Drains the accumulated table and dispatches one `value` event per
    /// key, named `"<name>.<key>"`, through `dispatcher`.
    pub fn raise_value_events(&self, dispatcher: &GlobalDispatcher) {
        let drained = std::mem::take(&mut *self.totals.lock().unwrap());
        for (key, value) in drained {
            dispatcher.dispatch_event(&Event::value(format!("{}{}", self.prefix, key), value));
        }
    }
}

impl Listener for ValueAccumulator {
    fn report_event(&self, event: &Event) {
        if event.name.starts_with(&self.prefix) || event.name == self.name {
            return;
        }
        if let Property::Value(v) = event.property {
            let mut totals = self.totals.lock().unwrap();
            *totals.entry(event.name.clone()).or_insert(0.0) += v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Capture(Arc<Mutex<Vec<Event>>>);
    impl Listener for Capture {
        fn report_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn accumulates_by_raw_name_and_reemits_prefixed() {
        let acc = ValueAccumulator::new("ac");
        acc.report_event(&Event::value("s1", 1.0));
        acc.report_event(&Event::value("s1", 2.0));
        acc.report_event(&Event::value("s2", 5.0));

        let dispatcher = GlobalDispatcher::new();
        let captured: Arc<Mutex<Vec<Event>>> = Default::default();
        dispatcher.add_listener(Arc::new(Capture(captured.clone())));

        acc.raise_value_events(&dispatcher);

        let events = captured.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| e.name == "ac.s1" && e.property == Property::Value(3.0)));
        assert!(events
            .iter()
            .any(|e| e.name == "ac.s2" && e.property == Property::Value(5.0)));
    }

    #[test]
    fn does_not_recurse_into_its_own_reemitted_events() {
        let acc = Arc::new(ValueAccumulator::new("ac"));
        acc.report_event(&Event::value("s1", 1.0));

        let dispatcher = GlobalDispatcher::new();
        dispatcher.add_listener(acc.clone() as Arc<dyn Listener>);

        // fans the accumulator's own output back through the dispatcher it
        // is itself attached to, the way the global tier would.
        acc.raise_value_events(&dispatcher);

        assert!(acc.totals.lock().unwrap().is_empty());
    }
}
