//! The name -> counter directory (§4.3).
//!
//! Grounded on `original_source/src/pycounters/base.py`'s `RegistryListener`:
//! rather than each counter subscribing to the global dispatcher
//! individually, a single `Registry` attaches itself as the one listener and
//! does the by-event-name fan-out internally. The teacher's
//! `opentelemetry_sdk::metrics::registry` takes the same shape (one
//! `Mutex`-guarded map, insert rejects on name collision).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::counters::Counter;
use crate::error::{PerfCounterError, Result};
use crate::event::{Event, Listener};
use crate::value::CounterValueCollection;

/// Holds every registered counter by name and routes dispatched events to
/// the counters subscribed to each event name. Implements [`Listener`]
/// itself so it can be attached to a dispatcher tier as the single routing
/// point (§4.3: "the registry, not individual counters, is the listener").
#[derive(Default)]
pub struct Registry {
    by_name: Mutex<HashMap<String, Arc<dyn Counter>>>,
    by_event: Mutex<HashMap<String, Vec<Arc<dyn Counter>>>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `counter` under its own name, subscribing it to every event
    /// name in [`Counter::events`]. Fails if a counter is already registered
    /// under that name (§4.3 "duplicate registration").
    pub fn add(&self, counter: Arc<dyn Counter>) -> Result<()> {
        let name = counter.name().to_string();
        let mut by_name = self.by_name.lock().unwrap();
        if by_name.contains_key(&name) {
            return Err(PerfCounterError::DuplicateCounter(name));
        }
        let mut by_event = self.by_event.lock().unwrap();
        for event_name in counter.events() {
            by_event.entry(event_name).or_default().push(counter.clone());
        }
        by_name.insert(name, counter);
        Ok(())
    }

    /// Unregisters the counter named `name`. Fails with
    /// [`PerfCounterError::UnknownCounter`] if no such counter exists.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut by_name = self.by_name.lock().unwrap();
        let counter = by_name
            .remove(name)
            .ok_or_else(|| PerfCounterError::UnknownCounter(name.to_string()))?;
        let mut by_event = self.by_event.lock().unwrap();
        for event_name in counter.events() {
            if let Some(subscribers) = by_event.get_mut(&event_name) {
                subscribers.retain(|c| !Arc::ptr_eq(c, &counter));
            }
        }
        Ok(())
    }

    /// The counter registered under `name`, if any.
    pub fn get_counter(&self, name: &str) -> Option<Arc<dyn Counter>> {
        self.by_name.lock().unwrap().get(name).cloned()
    }

    /// A snapshot of every registered counter's current value, keyed by name
    /// (§4.4 "report()" takes this snapshot under the reporting lock).
    pub fn get_values(&self) -> CounterValueCollection {
        let by_name = self.by_name.lock().unwrap();
        let mut values = CounterValueCollection::new();
        for (name, counter) in by_name.iter() {
            values.insert(name.clone(), counter.get_value());
        }
        values
    }

    /// Clears every registered counter in place (§4.2 "Clear semantics").
    pub fn clear_all(&self) {
        for counter in self.by_name.lock().unwrap().values() {
            counter.clear();
        }
    }
}

impl Listener for Registry {
    fn report_event(&self, event: &Event) {
        let subscribers: Vec<Arc<dyn Counter>> = self
            .by_event
            .lock()
            .unwrap()
            .get(&event.name)
            .cloned()
            .unwrap_or_default();
        for counter in subscribers {
            counter.report_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::EventCounter;

    #[test]
    fn routes_events_by_name_to_the_right_counter() {
        let registry = Registry::new();
        registry.add(Arc::new(EventCounter::new("a"))).unwrap();
        registry.add(Arc::new(EventCounter::new("b"))).unwrap();

        registry.report_event(&Event::end("a"));
        registry.report_event(&Event::end("a"));
        registry.report_event(&Event::end("b"));

        let values = registry.get_values();
        assert_eq!(values.get("a").unwrap().value(), Some(2.0));
        assert_eq!(values.get("b").unwrap().value(), Some(1.0));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Registry::new();
        registry.add(Arc::new(EventCounter::new("a"))).unwrap();
        let err = registry.add(Arc::new(EventCounter::new("a"))).unwrap_err();
        assert!(matches!(err, PerfCounterError::DuplicateCounter(_)));
    }

    #[test]
    fn removing_unknown_counter_errors() {
        let registry = Registry::new();
        let err = registry.remove("missing").unwrap_err();
        assert!(matches!(err, PerfCounterError::UnknownCounter(_)));
    }

    #[test]
    fn removed_counter_stops_receiving_events() {
        let registry = Registry::new();
        registry.add(Arc::new(EventCounter::new("a"))).unwrap();
        registry.remove("a").unwrap();
        registry.report_event(&Event::end("a"));
        assert!(registry.get_counter("a").is_none());
    }
}
