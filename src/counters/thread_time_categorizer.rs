use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use thread_local::ThreadLocal;

use crate::clock::{Clock, SystemClock};
use crate::dispatch::GlobalDispatcher;
use crate::event::{Event, Listener, Property};

/// A single thread's currently-open category: which one, and when it (or
/// its most recent resume) started running.
struct Frame {
    category: String,
    started_at: f64,
}

/// Attributes wall-clock time to one of a fixed set of named categories per
/// thread, enforcing that exactly one category is "running" at a time: a
/// nested `start` pauses its parent and a matching `end` resumes it
/// (§4.2 "ThreadTimeCategorizer").
///
/// Grounded on `original_source/src/pycounters/counters/threads.py`'s
/// `ThreadTimeCategorizer`, which keeps a `threading.local` stack of
/// categories per thread and only ever times the top of the stack. Like
/// [`super::ValueAccumulator`] this is not a [`super::Counter`] — its
/// aggregate is a map — so it attaches to a dispatcher tier as a bare
/// [`Listener`].
pub struct ThreadTimeCategorizer {
    name: String,
    categories: HashSet<String>,
    clock: Arc<dyn Clock>,
    totals: Mutex<HashMap<String, f64>>,
    stacks: ThreadLocal<RefCell<Vec<Frame>>>,
}

impl ThreadTimeCategorizer {
    /// Tracks wall time for exactly `categories`, using the system clock.
    /// `start`/`end` events for any other name are ignored.
    pub fn new(name: impl Into<String>, categories: impl IntoIterator<Item = String>) -> Self {
        Self::with_clock(name, categories, Arc::new(SystemClock))
    }

    /// As [`Self::new`], but reading time from `clock` (for tests, §10.4).
    pub fn with_clock(
        name: impl Into<String>,
        categories: impl IntoIterator<Item = String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ThreadTimeCategorizer {
            name: name.into(),
            categories: categories.into_iter().collect(),
            clock,
            totals: Mutex::new(HashMap::new()),
            stacks: ThreadLocal::new(),
        }
    }

    fn stack(&self) -> &RefCell<Vec<Frame>> {
        self.stacks.get_or(|| RefCell::new(Vec::new()))
    }

    fn add_total(&self, category: &str, elapsed: f64) {
        let mut totals = self.totals.lock().unwrap();
        *totals.entry(category.to_string()).or_insert(0.0) += elapsed;
    }

    fn on_start(&self, category: &str) {
        let now = self.clock.now_secs();
        let mut stack = self.stack().borrow_mut();
        if let Some(parent) = stack.last() {
            self.add_total(&parent.category, now - parent.started_at);
        }
        stack.push(Frame {
            category: category.to_string(),
            started_at: now,
        });
    }

    fn on_end(&self, category: &str) {
        let now = self.clock.now_secs();
        let mut stack = self.stack().borrow_mut();
        match stack.last() {
            Some(top) if top.category == category => {
                let frame = stack.pop().unwrap();
                self.add_total(&frame.category, now - frame.started_at);
                if let Some(parent) = stack.last_mut() {
                    parent.started_at = now;
                }
            }
            // an `end` that doesn't match the currently-open category is a
            // caller bug; ignore it rather than corrupt the stack.
            _ => {}
        }
    }

    /// Drains the accumulated per-category totals and emits one `value`
    /// event per category, named `"<name>.<category>"`, through
    /// `dispatcher`.
    pub fn raise_value_events(&self, dispatcher: &GlobalDispatcher) {
        let drained = std::mem::take(&mut *self.totals.lock().unwrap());
        for (category, total) in drained {
            dispatcher.dispatch_event(&Event::value(format!("{}.{}", self.name, category), total));
        }
    }
}

impl Listener for ThreadTimeCategorizer {
    fn report_event(&self, event: &Event) {
        if !self.categories.contains(&event.name) {
            return;
        }
        match event.property {
            Property::Start => self.on_start(&event.name),
            Property::End => self.on_end(&event.name),
            Property::Value(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::StepClock;

    #[test]
    fn nested_categories_are_mutually_exclusive() {
        let clock = Arc::new(StepClock::new(1.0));
        let cat = ThreadTimeCategorizer::with_clock(
            "phase",
            ["outer".to_string(), "inner".to_string()],
            clock,
        );

        cat.report_event(&Event::start("outer")); // t=0 -> 1
        cat.report_event(&Event::start("inner")); // t=1 -> 2, pauses outer (1s)
        cat.report_event(&Event::end("inner")); // t=2 -> 3, inner gets 1s, resumes outer
        cat.report_event(&Event::end("outer")); // t=3 -> 4, outer gets 1s more

        let totals = cat.totals.lock().unwrap().clone();
        assert_eq!(totals.get("outer").copied(), Some(2.0));
        assert_eq!(totals.get("inner").copied(), Some(1.0));
    }

    #[test]
    fn unknown_category_events_are_ignored() {
        let clock = Arc::new(StepClock::new(1.0));
        let cat = ThreadTimeCategorizer::with_clock("phase", ["outer".to_string()], clock);
        cat.report_event(&Event::start("unrelated"));
        cat.report_event(&Event::end("unrelated"));
        assert!(cat.totals.lock().unwrap().is_empty());
    }
}
