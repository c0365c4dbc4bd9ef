//! Two-tier event fan-out (§4.1): a process-global dispatcher every
//! [`crate::registry::Registry`] counter is attached to, and a per-thread
//! dispatcher thread-scoped listeners (accumulators, categorizers) attach to
//! instead.
//!
//! Grounded on `original_source/src/pycounters/base.py`'s `EventDispatcher`
//! (global, `RLock`-guarded `listeners` set) and `ThreadSpecificDispatcher`
//! (`threading.local`-backed, percolates to the global dispatcher after its
//! own tier). The teacher's own thread-local story
//! (`opentelemetry_sdk::metrics::internal::attribute_set_aggregation`) keeps
//! state in a `Mutex`-guarded map keyed by thread id rather than true TLS;
//! here we use `std::thread_local!` directly since every listener on this
//! tier is scoped to exactly one OS thread for its whole lifetime.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::event::{Event, Listener};

/// Process-wide fan-out tier. The [`crate::registry::Registry`] attaches
/// counters here; every event also reaches this tier via [`dispatch_event`]
/// regardless of which thread raised it.
#[derive(Default)]
pub struct GlobalDispatcher {
    listeners: Mutex<Vec<Arc<dyn Listener>>>,
}

impl GlobalDispatcher {
    /// A dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` on this tier.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Unregisters the listener whose `Arc` pointer matches `listener`.
    /// A no-op if it isn't currently registered.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Fans `event` out to every currently-registered listener.
    ///
    /// Listeners are snapshotted (cloned `Arc`s) under the lock and then
    /// invoked with the lock released, so a listener may add/remove other
    /// listeners (or itself) during its own `report_event` without
    /// deadlocking. A panicking listener is isolated: the remaining
    /// listeners still run (§4.1, §7 "Listener-local").
    pub fn dispatch_event(&self, event: &Event) {
        let snapshot: Vec<Arc<dyn Listener>> = self.listeners.lock().unwrap().clone();
        for listener in snapshot {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener.report_event(event))) {
                tracing::warn!(
                    counter = %event.name,
                    "listener panicked during dispatch: {}",
                    panic_message(&panic)
                );
            }
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

thread_local! {
    static THREAD_LISTENERS: RefCell<Vec<Arc<dyn Listener>>> = const { RefCell::new(Vec::new()) };
}

/// The thread-local tier. Zero-sized: all state lives in the `thread_local!`
/// storage so each OS thread gets its own independent listener set without
/// any shared synchronization.
#[derive(Default, Clone, Copy)]
pub struct ThreadDispatcher;

impl ThreadDispatcher {
    /// A handle to the calling thread's dispatcher tier.
    pub fn new() -> Self {
        ThreadDispatcher
    }

    /// Registers `listener` on the calling thread's tier only.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        THREAD_LISTENERS.with(|l| l.borrow_mut().push(listener));
    }

    /// Unregisters `listener` from the calling thread's tier.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        THREAD_LISTENERS.with(|l| l.borrow_mut().retain(|x| !Arc::ptr_eq(x, listener)));
    }

    /// Fans `event` out to the calling thread's listeners, then to the
    /// process-global tier (§4.1: "first ... fans out to the current
    /// thread's listener set, then to the global set").
    pub fn dispatch_event(&self, event: &Event, global: &GlobalDispatcher) {
        let snapshot: Vec<Arc<dyn Listener>> =
            THREAD_LISTENERS.with(|l| l.borrow().clone());
        for listener in snapshot {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener.report_event(event))) {
                tracing::warn!(
                    counter = %event.name,
                    "thread-local listener panicked during dispatch: {}",
                    panic_message(&panic)
                );
            }
        }
        global.dispatch_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Property;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(AtomicUsize);

    impl Listener for CountingListener {
        fn report_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingListener;
    impl Listener for PanickingListener {
        fn report_event(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn global_dispatch_reaches_every_listener() {
        let dispatcher = GlobalDispatcher::new();
        let a = Arc::new(CountingListener(AtomicUsize::new(0)));
        let b = Arc::new(CountingListener(AtomicUsize::new(0)));
        dispatcher.add_listener(a.clone() as Arc<dyn Listener>);
        dispatcher.add_listener(b.clone() as Arc<dyn Listener>);

        dispatcher.dispatch_event(&Event {
            name: "x".into(),
            property: Property::Value(1.0),
        });

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_fanout() {
        let dispatcher = GlobalDispatcher::new();
        let counter = Arc::new(CountingListener(AtomicUsize::new(0)));
        dispatcher.add_listener(Arc::new(PanickingListener));
        dispatcher.add_listener(counter.clone() as Arc<dyn Listener>);

        dispatcher.dispatch_event(&Event {
            name: "x".into(),
            property: Property::End,
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_listener_stops_future_dispatch() {
        let dispatcher = GlobalDispatcher::new();
        let counter = Arc::new(CountingListener(AtomicUsize::new(0)));
        let as_listener = counter.clone() as Arc<dyn Listener>;
        dispatcher.add_listener(as_listener.clone());
        dispatcher.remove_listener(&as_listener);

        dispatcher.dispatch_event(&Event {
            name: "x".into(),
            property: Property::End,
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn thread_local_tier_is_isolated_per_thread() {
        let global = GlobalDispatcher::new();
        let global_hits = Arc::new(CountingListener(AtomicUsize::new(0)));
        global.add_listener(global_hits.clone() as Arc<dyn Listener>);

        let td = ThreadDispatcher::new();
        let local = Arc::new(CountingListener(AtomicUsize::new(0)));
        td.add_listener(local.clone() as Arc<dyn Listener>);

        td.dispatch_event(
            &Event {
                name: "x".into(),
                property: Property::End,
            },
            &global,
        );

        // other thread never sees the thread-local listener, but the global
        // tier is reached from any thread.
        let handle = std::thread::spawn(move || {
            let td2 = ThreadDispatcher::new();
            td2.dispatch_event(
                &Event {
                    name: "y".into(),
                    property: Property::End,
                },
                &global,
            );
        });
        handle.join().unwrap();

        assert_eq!(local.0.load(Ordering::SeqCst), 1);
        assert_eq!(global_hits.0.load(Ordering::SeqCst), 2);
    }
}
