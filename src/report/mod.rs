//! Periodic and manual reporting (§4.4): snapshot the registry, optionally
//! merge in a multi-process collection, and hand the result to every
//! registered [`Reporter`].
//!
//! Grounded on `original_source/src/pycounters/reports.py`'s
//! `ReportingThread` (a daemon thread looping on a configurable interval,
//! catching and logging reporter exceptions so one bad reporter never kills
//! the loop) and structurally on the teacher's
//! `opentelemetry_sdk::metrics::periodic_reader::PeriodicReader`: an `mpsc`
//! channel carrying `Flush`/`Shutdown` messages into a `recv_timeout` loop
//! on a dedicated background thread.

mod json_file_reporter;
mod log_reporter;
mod reporter;

pub use json_file_reporter::JsonFileReporter;
pub use log_reporter::LogReporter;
pub use reporter::Reporter;

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PerfCounterError, Result};
use crate::registry::Registry;
use crate::value::CounterValueCollection;

/// A source of other processes' counter snapshots to merge into a local
/// report before it is emitted, wired up by
/// [`crate::collection::CollectingLeader`] when multi-process collection is
/// enabled (§4.6). Plain local reporting leaves this unset.
pub type MergeSource = dyn Fn() -> Result<CounterValueCollection> + Send + Sync;

enum Message {
    Flush(Sender<Result<()>>),
    Shutdown(Sender<()>),
}

struct Worker {
    sender: Sender<Message>,
    handle: JoinHandle<()>,
}

/// Owns the registry snapshot, the set of reporters, and (optionally) a
/// background thread that calls [`Self::report`] on a fixed interval.
pub struct ReportingController {
    registry: Arc<Registry>,
    reporters: Mutex<Vec<Arc<dyn Reporter>>>,
    merge_source: Mutex<Option<Arc<MergeSource>>>,
    worker: Mutex<Option<Worker>>,
}

impl ReportingController {
    /// A controller with no reporters and auto-reporting stopped.
    pub fn new(registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(ReportingController {
            registry,
            reporters: Mutex::new(Vec::new()),
            merge_source: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Adds `reporter` to the set invoked on every reporting cycle.
    pub fn add_reporter(&self, reporter: Arc<dyn Reporter>) {
        self.reporters.lock().unwrap().push(reporter);
    }

    /// Removes a previously-added reporter by `Arc` identity. A no-op if it
    /// isn't currently registered.
    pub fn remove_reporter(&self, reporter: &Arc<dyn Reporter>) {
        self.reporters
            .lock()
            .unwrap()
            .retain(|r| !Arc::ptr_eq(r, reporter));
    }

    /// Installs the multi-process merge hook; `None` reverts to pure local
    /// reporting (§4.6: a node that loses leadership stops merging).
    pub fn set_merge_source(&self, source: Option<Arc<MergeSource>>) {
        *self.merge_source.lock().unwrap() = source;
    }

    /// Snapshots the registry, merges in [`Self::set_merge_source`]'s result
    /// if one is installed, and emits the result to every reporter. Errors
    /// from individual reporters are collected and returned to the caller —
    /// this is the manual, synchronous path (§4.4 "report()"); the
    /// background auto-reporting loop uses [`Self::report_and_route_errors`]
    /// instead, since there is no caller to return to.
    pub fn report(&self) -> Result<()> {
        let values = self.snapshot()?;
        let reporters = self.reporters.lock().unwrap().clone();
        for reporter in &reporters {
            reporter.output_values(&values)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<CounterValueCollection> {
        let mut values = self.registry.get_values();
        if let Some(source) = self.merge_source.lock().unwrap().as_ref() {
            values.merge_with(&source()?)?;
        }
        Ok(values)
    }

    /// As [`Self::report`], but a failing reporter is routed to its own
    /// [`Reporter::handle_background_error`] instead of aborting the cycle,
    /// so one misbehaving reporter never starves the others or kills the
    /// background thread (§4.4 "the worker never dies").
    fn report_and_route_errors(&self) {
        let values = match self.snapshot() {
            Ok(values) => values,
            Err(err) => {
                tracing::error!(error = %err, "failed to snapshot counters for background report");
                return;
            }
        };
        let reporters = self.reporters.lock().unwrap().clone();
        for reporter in &reporters {
            if let Err(err) = reporter.output_values(&values) {
                reporter.handle_background_error(&err);
            }
        }
    }

    /// Starts the background reporting thread, calling [`Self::report`]
    /// every `interval`. A no-op if auto-reporting is already running.
    pub fn start_auto_reporting(self: &Arc<Self>, interval: Duration) {
        let mut worker_slot = self.worker.lock().unwrap();
        if worker_slot.is_some() {
            return;
        }
        let (sender, receiver) = mpsc::channel();
        let controller = self.clone();
        let handle = thread::spawn(move || loop {
            match receiver.recv_timeout(interval) {
                Ok(Message::Flush(reply)) => {
                    let _ = reply.send(controller.report());
                }
                Ok(Message::Shutdown(reply)) => {
                    controller.report_and_route_errors();
                    let _ = reply.send(());
                    break;
                }
                Err(RecvTimeoutError::Timeout) => controller.report_and_route_errors(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        *worker_slot = Some(Worker { sender, handle });
    }

    /// Stops the background reporting thread, if running, performing one
    /// final report before it exits. A no-op if auto-reporting isn't
    /// running.
    pub fn stop_auto_reporting(&self) {
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let (reply_tx, reply_rx) = mpsc::channel();
            if worker.sender.send(Message::Shutdown(reply_tx)).is_ok() {
                let _ = reply_rx.recv();
            }
            let _ = worker.handle.join();
        }
    }

    /// Triggers an immediate out-of-band report from the background thread
    /// and waits for it to complete, without disturbing the regular
    /// interval. Returns an error if auto-reporting isn't running.
    pub fn flush(&self) -> Result<()> {
        let worker = self.worker.lock().unwrap();
        let worker = worker
            .as_ref()
            .ok_or_else(|| PerfCounterError::NotRunning("auto-reporting is not running".into()))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        worker
            .sender
            .send(Message::Flush(reply_tx))
            .map_err(|_| PerfCounterError::NotRunning("reporting thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| PerfCounterError::NotRunning("reporting thread is gone".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::EventCounter;
    use crate::value::CounterValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingReporter {
        calls: AtomicUsize,
        last: Mutex<Option<CounterValueCollection>>,
    }

    impl Reporter for RecordingReporter {
        fn output_values(&self, values: &CounterValueCollection) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(values.clone());
            Ok(())
        }
    }

    struct FailingReporter {
        handled: AtomicUsize,
    }

    impl Reporter for FailingReporter {
        fn output_values(&self, _values: &CounterValueCollection) -> Result<()> {
            Err(PerfCounterError::MergeIncompatible("boom".into()))
        }

        fn handle_background_error(&self, _error: &PerfCounterError) {
            self.handled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn manual_report_reaches_every_reporter() {
        let registry = Arc::new(Registry::new());
        registry.add(Arc::new(EventCounter::new("hits"))).unwrap();
        registry.get_counter("hits").unwrap().report_event(&crate::event::Event::end("hits"));

        let controller = ReportingController::new(registry);
        let reporter = Arc::new(RecordingReporter {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        controller.add_reporter(reporter.clone());

        controller.report().unwrap();

        assert_eq!(reporter.calls.load(Ordering::SeqCst), 1);
        let last = reporter.last.lock().unwrap();
        assert_eq!(last.as_ref().unwrap().get("hits").unwrap().value(), Some(1.0));
    }

    #[test]
    fn manual_report_propagates_reporter_errors() {
        let registry = Arc::new(Registry::new());
        let controller = ReportingController::new(registry);
        controller.add_reporter(Arc::new(FailingReporter {
            handled: AtomicUsize::new(0),
        }));

        assert!(controller.report().is_err());
    }

    #[test]
    fn background_report_routes_errors_instead_of_propagating() {
        let registry = Arc::new(Registry::new());
        let controller = ReportingController::new(registry);
        let failing = Arc::new(FailingReporter {
            handled: AtomicUsize::new(0),
        });
        controller.add_reporter(failing.clone());

        controller.report_and_route_errors();

        assert_eq!(failing.handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn merge_source_is_combined_into_the_snapshot() {
        let registry = Arc::new(Registry::new());
        registry.add(Arc::new(EventCounter::new("hits"))).unwrap();

        let controller = ReportingController::new(registry);
        controller.set_merge_source(Some(Arc::new(|| {
            let mut other = CounterValueCollection::new();
            other.insert("hits", CounterValue::Accumulative(Some(41.0)));
            Ok(other)
        })));

        let reporter = Arc::new(RecordingReporter {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        controller.add_reporter(reporter.clone());
        controller.report().unwrap();

        let last = reporter.last.lock().unwrap();
        assert_eq!(last.as_ref().unwrap().get("hits").unwrap().value(), Some(41.0));
    }

    #[test]
    fn start_and_stop_auto_reporting_runs_at_least_once() {
        let registry = Arc::new(Registry::new());
        let controller = ReportingController::new(registry);
        let reporter = Arc::new(RecordingReporter {
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        });
        controller.add_reporter(reporter.clone());

        controller.start_auto_reporting(Duration::from_millis(10));
        controller.flush().unwrap();
        controller.stop_auto_reporting();

        assert!(reporter.calls.load(Ordering::SeqCst) >= 1);
    }
}
