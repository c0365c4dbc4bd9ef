//! Scope and decorator helpers built on the raw `report_start`/`report_end`/
//! `report_value` calls (§6 "Decorators").
//!
//! `original_source/src/pycounters/decorators.py` wraps a function with a
//! `try/finally` that brackets the call with `report_start`/`report_end`
//! (`@count`, `@time`), or reports the return value as a `value` event
//! (`@value`). Rust has no decorator syntax, so each one becomes a plain
//! function taking the name and a closure to run, plus [`report_start_end`]
//! for the `with`-block shape wrapping an arbitrary scope.

use crate::{report_end, report_start, report_value};

/// An RAII guard that raises `start` on construction and `end` on every
/// exit path — including an early return or an unwinding panic inside the
/// guarded scope — so a counter can never observe a `start` with no
/// matching `end` (§6 "report_start_end", invariant 8 "Scoped balance").
///
/// ```
/// # use perfcounters::report_start_end;
/// fn handle_request() {
///     let _scope = report_start_end("handle_request");
///     // ... work ...
/// } // `end` is raised here, even if `work` panics.
/// ```
pub struct ScopeGuard {
    name: String,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        report_end(self.name.clone());
    }
}

/// Opens a scope named `name`: raises `start` now, and `end` when the
/// returned guard drops.
pub fn report_start_end(name: impl Into<String>) -> ScopeGuard {
    let name = name.into();
    report_start(name.clone());
    ScopeGuard { name }
}

/// Raises `end` on drop only — the `count`/`frequency` counterpart to
/// [`ScopeGuard`], which also raises `start`. Kept separate rather than
/// reusing `ScopeGuard` so the dispatch trace for `count`/`frequency` stays
/// exactly what their counters consume (`end`/`value`, never `start`), while
/// still giving both the same panic-safety guarantee `time` gets from
/// `report_start_end` (`original_source/src/pycounters/shortcuts.py`'s
/// `_make_reporting_decorator` wraps every decorator in `try/finally`).
struct EndOnDrop {
    name: String,
}

impl Drop for EndOnDrop {
    fn drop(&mut self) {
        report_end(self.name.clone());
    }
}

/// Wraps `f`, counting how many times it's called (§6 `@count`, typically
/// paired with [`crate::counters::EventCounter`]). `end` fires even if `f`
/// panics, so a counter can't silently undercount.
pub fn count<R>(name: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let _guard = EndOnDrop { name: name.into() };
    f()
}

/// Wraps `f`, feeding a [`crate::counters::FrequencyCounter`] one call-rate
/// sample per invocation (§6 `@frequency`). `end` fires even if `f` panics.
pub fn frequency<R>(name: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let _guard = EndOnDrop { name: name.into() };
    f()
}

/// Wraps `f`, timing its duration for a
/// [`crate::counters::AverageTimeCounter`] (§6 `@time`). `start`/`end`
/// bracket the call even if `f` panics, via [`report_start_end`].
pub fn time<R>(name: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let _scope = report_start_end(name);
    f()
}

/// Wraps `f`, reporting its `f64` return value as a `value` event for any
/// `*WindowCounter` or [`crate::counters::ValueAccumulator`] subscribed to
/// `name` (§6 `@value`).
pub fn value(name: impl Into<String>, f: impl FnOnce() -> f64) -> f64 {
    let result = f();
    report_value(name, result);
    result
}

/// Runs `f` and reports one occurrence (`value` event with payload `1.0`)
/// for it, regardless of `f`'s return value (§6 `@occurrence`).
pub fn occurrence<R>(name: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let result = f();
    report_value(name, 1.0);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{Counter, EventCounter};
    use crate::{register_counter, unregister_counter};
    use std::panic;
    use std::sync::Arc;

    #[test]
    fn count_raises_end_even_when_f_panics() {
        let name = "ut_scope_count_panic_safety";
        let counter = Arc::new(EventCounter::new(name));
        register_counter(counter.clone()).unwrap();

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            count(name, || panic!("simulated failure inside a counted call"))
        }));
        assert!(result.is_err());
        assert_eq!(counter.get_value().value(), Some(1.0));

        unregister_counter(name).unwrap();
    }
}
