//! The event vocabulary (§3) dispatch fans out and counters consume.
//!
//! Grounded on `original_source/src/pycounters/base.py`'s `BaseListener`
//! (`report_event(name, property, param)`), recast as a Rust trait the way
//! the teacher turns Python ABCs into traits for `MeterCore`/`InstrumentCore`
//! (`opentelemetry_sdk::metrics::sdk_api`).

/// What happened at the point an event was raised.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Property {
    /// Entry into a scope (function call, `with` block).
    Start,
    /// Exit from a scope opened by a matching `Start`.
    End,
    /// A bare discrete value observation, not part of a start/end pair.
    Value(f64),
}

/// A `(name, property)` pair dispatched to every listener on the matching tier.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The counter/accumulator name this event targets.
    pub name: String,
    /// What happened.
    pub property: Property,
}

impl Event {
    /// Builds a `start` event.
    pub fn start(name: impl Into<String>) -> Self {
        Event {
            name: name.into(),
            property: Property::Start,
        }
    }

    /// Builds an `end` event.
    pub fn end(name: impl Into<String>) -> Self {
        Event {
            name: name.into(),
            property: Property::End,
        }
    }

    /// Builds a `value` event.
    pub fn value(name: impl Into<String>, v: f64) -> Self {
        Event {
            name: name.into(),
            property: Property::Value(v),
        }
    }
}

/// Anything that can receive dispatched events: a counter, a
/// [`crate::counters::ValueAccumulator`], a [`crate::counters::ThreadTimeCategorizer`],
/// or a test probe.
///
/// `report_event` must not panic across the dispatch boundary for well-behaved
/// listeners; [`crate::dispatch`] isolates panics per listener regardless (§4.1).
pub trait Listener: Send + Sync {
    /// Delivers one event to this listener.
    fn report_event(&self, event: &Event);
}
