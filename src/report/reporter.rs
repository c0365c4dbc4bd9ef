use crate::error::{PerfCounterError, Result};
use crate::value::CounterValueCollection;

/// A pluggable report sink (§4.5): given a snapshot of every counter's
/// current value, do something with it.
///
/// Grounded on `original_source/src/pycounters/reporters/base.py`'s
/// `BaseReporter.output_values`, recast the way the teacher turns exporter
/// ABCs into traits (`opentelemetry_sdk::metrics::exporter::PushMetricsExporter`).
pub trait Reporter: Send + Sync {
    /// Emits `values`. Called once per reporting cycle, either from a
    /// manual [`super::ReportingController::report`] or from the background
    /// auto-reporting thread.
    fn output_values(&self, values: &CounterValueCollection) -> Result<()>;

    /// Called when this reporter's `output_values` fails during background
    /// (not manual) reporting, since there is no caller left to propagate
    /// the error to. The default just logs; a reporter with its own
    /// escalation policy (paging, metrics-about-metrics) can override it.
    fn handle_background_error(&self, error: &PerfCounterError) {
        tracing::error!(error = %error, "reporter failed during background report");
    }
}
