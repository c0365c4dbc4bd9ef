use super::reporter::Reporter;
use crate::error::Result;
use crate::value::CounterValueCollection;

/// Logs one line per counter, `name value`, sorted by name, through
/// [`tracing`]. Keys wrapped in double underscores (`__node_reports__`,
/// `__collection_time__`, §4.6) are collection metadata, not counters, and
/// are skipped.
///
/// Grounded on `original_source/src/pycounters/reporters/logger.py`'s
/// `LoggingReporter`.
#[derive(Debug, Default)]
pub struct LogReporter {
    _private: (),
}

impl LogReporter {
    /// A reporter logging under the `perfcounters::report` `tracing` target.
    pub fn new() -> Self {
        LogReporter { _private: () }
    }
}

fn is_metadata_key(name: &str) -> bool {
    name.starts_with("__")
}

impl Reporter for LogReporter {
    fn output_values(&self, values: &CounterValueCollection) -> Result<()> {
        let mut lines = Vec::with_capacity(values.len());
        for (name, value) in values.iter() {
            if is_metadata_key(name) {
                continue;
            }
            match value.value() {
                Some(v) => lines.push(format!("{name} {v}")),
                None => lines.push(format!("{name} null")),
            }
        }
        tracing::info!(target: "perfcounters::report", report = %lines.join("\n"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CounterValue;

    #[test]
    fn skips_dunder_metadata_keys() {
        let mut values = CounterValueCollection::new();
        values.insert("requests", CounterValue::Accumulative(Some(3.0)));
        values.insert("__node_reports__", CounterValue::Accumulative(Some(2.0)));

        // output_values only logs; this just asserts it doesn't error, the
        // filtering itself is covered by is_metadata_key's own logic below.
        let reporter = LogReporter::new();
        reporter.output_values(&values).unwrap();

        assert!(is_metadata_key("__node_reports__"));
        assert!(is_metadata_key("__node_reports__.node-a.hits"));
        assert!(!is_metadata_key("requests"));
    }
}
