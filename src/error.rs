//! Crate-wide error type.
//!
//! Mirrors the split the teacher SDK uses between an internal `MetricError`
//! (`opentelemetry_sdk::metrics::error`) and a public `OTelSdkError`
//! (`opentelemetry_sdk::error`): one `thiserror` enum, one variant per
//! semantic failure kind, a `PoisonError` conversion so lock poisoning never
//! needs an `unwrap()` at the call site.

use std::result;
use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for this crate's fallible operations.
pub type Result<T> = result::Result<T, PerfCounterError>;

/// Errors raised by the counter/dispatch/reporting/collection pipeline.
///
/// Per the propagation policy: `DuplicateCounter`, `UnknownCounter`,
/// `ElectionTimeout` and `MergeIncompatible` are meant to reach the caller.
/// `Io` is caught internally by the node/leader runtime and turned into a
/// re-election rather than surfaced, except where returned directly from a
/// one-shot operation like [`crate::report::JsonFileReporter::read`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PerfCounterError {
    /// `Registry::add` was called in strict mode with a name already present.
    #[error("a counter named '{0}' is already registered")]
    DuplicateCounter(String),

    /// `Registry::get` (or a lookup through it) was called in strict mode
    /// for a name with no registered counter.
    #[error("no counter named '{0}' is registered")]
    UnknownCounter(String),

    /// Every configured endpoint was exhausted without electing a leader.
    #[error("failed to elect a leader after {attempts} attempts within {timeout_secs}s")]
    ElectionTimeout {
        /// Number of connect/bind attempts made.
        attempts: u32,
        /// Configured total timeout.
        timeout_secs: u64,
    },

    /// Two [`crate::value::CounterValue`]s sharing a key were not the same
    /// algebra variant and cannot be merged.
    #[error("cannot merge counter '{0}': incompatible value kinds")]
    MergeIncompatible(String),

    /// Socket, lock-file, or JSON I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure, e.g. reading a corrupt report file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wire-protocol (de)serialization failure between node and leader.
    #[error("wire protocol error: {0}")]
    Wire(#[from] bincode::Error),

    /// A shared mutex was poisoned by a panicking holder.
    #[error("internal lock was poisoned: {0}")]
    Poisoned(String),

    /// An operation that requires the background reporting thread (e.g.
    /// [`crate::report::ReportingController::flush`]) was called while it
    /// wasn't running.
    #[error("{0}")]
    NotRunning(String),
}

impl<T> From<PoisonError<T>> for PerfCounterError {
    fn from(err: PoisonError<T>) -> Self {
        PerfCounterError::Poisoned(err.to_string())
    }
}
