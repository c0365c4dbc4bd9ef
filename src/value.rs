//! The counter-value algebra (§3): mergeable aggregates a [`crate::counters::Counter`]
//! hands back from `get_value()`, and the flat collection a [`crate::registry::Registry`]
//! snapshots them into.
//!
//! Grounded on `original_source/src/pycounters/values.py` (`AccumulativeCounterValue`,
//! `AverageCounterValue`, `MaxCounterValue`, `MinCounterValue`, `CounterValueCollection`),
//! recast as a tagged union the way the teacher models aggregator state in
//! `opentelemetry_sdk::metrics::internal::sum`/`last_value`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PerfCounterError, Result};

/// A mergeable counter value, tagged by the algebra that produced it.
///
/// `null` (the empty/absent reading) is represented as `None` in every
/// variant. Merge is commutative and associative within a variant; merging
/// two different variants is a [`PerfCounterError::MergeIncompatible`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CounterValue {
    /// Sum of non-null addends. `None ⊕ x = x`.
    Accumulative(Option<f64>),
    /// Weighted mean, carried as `(value, weight)` pairs so merges stay exact.
    Average(Vec<(f64, f64)>),
    /// Element-wise minimum, skipping `None`.
    Min(Option<f64>),
    /// Element-wise maximum, skipping `None`.
    Max(Option<f64>),
}

impl CounterValue {
    /// The scalar reading a reporter or the JSON output should show.
    pub fn value(&self) -> Option<f64> {
        match self {
            CounterValue::Accumulative(v) => *v,
            CounterValue::Min(v) => *v,
            CounterValue::Max(v) => *v,
            CounterValue::Average(pairs) => {
                if pairs.is_empty() {
                    None
                } else {
                    let (sum, weight) = pairs
                        .iter()
                        .fold((0.0, 0.0), |(s, w), (v, c)| (s + v * c, w + c));
                    if weight == 0.0 {
                        None
                    } else {
                        Some(sum / weight)
                    }
                }
            }
        }
    }

    /// Merges `other` into `self` in place, as used for multi-process
    /// collection (§4.6) and for combining successive local readings.
    pub fn merge_with(&mut self, other: &CounterValue) -> Result<()> {
        match (self, other) {
            (CounterValue::Accumulative(a), CounterValue::Accumulative(b)) => {
                *a = match (*a, *b) {
                    (None, None) => None,
                    (Some(x), None) => Some(x),
                    (None, Some(y)) => Some(y),
                    (Some(x), Some(y)) => Some(x + y),
                };
                Ok(())
            }
            (CounterValue::Average(a), CounterValue::Average(b)) => {
                a.extend(b.iter().copied());
                Ok(())
            }
            (CounterValue::Min(a), CounterValue::Min(b)) => {
                *a = match (*a, *b) {
                    (None, other) => other,
                    (cur, None) => cur,
                    (Some(x), Some(y)) => Some(x.min(y)),
                };
                Ok(())
            }
            (CounterValue::Max(a), CounterValue::Max(b)) => {
                *a = match (*a, *b) {
                    (None, other) => other,
                    (cur, None) => cur,
                    (Some(x), Some(y)) => Some(x.max(y)),
                };
                Ok(())
            }
            _ => Err(PerfCounterError::MergeIncompatible(
                "value kinds differ".into(),
            )),
        }
    }
}

/// A name → [`CounterValue`] snapshot, as produced by [`crate::registry::Registry::get_values`]
/// and merged across nodes by a collecting leader.
///
/// Kept as a `BTreeMap` (rather than a `HashMap`) so reporters that print in
/// name order, such as the log reporter (§4.5), don't need their own sort.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CounterValueCollection(BTreeMap<String, CounterValue>);

impl CounterValueCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: CounterValue) {
        self.0.insert(name.into(), value);
    }

    /// Looks up the raw [`CounterValue`] for `name`.
    pub fn get(&self, name: &str) -> Option<&CounterValue> {
        self.0.get(name)
    }

    /// Iterates `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CounterValue)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flattens to a `name -> scalar` map, the shape reporters consume (§4.5).
    /// `None` values are preserved as JSON `null` once serialized.
    pub fn scalars(&self) -> BTreeMap<String, Option<f64>> {
        self.0.iter().map(|(k, v)| (k.clone(), v.value())).collect()
    }

    /// Merges `other` into `self` key-by-key (§3). A key present only in
    /// `other` is adopted as-is; a key present in both must be the same
    /// algebra variant or this fails with [`PerfCounterError::MergeIncompatible`].
    pub fn merge_with(&mut self, other: &CounterValueCollection) -> Result<()> {
        for (k, v) in other.0.iter() {
            match self.0.get_mut(k) {
                Some(existing) => existing.merge_with(v)?,
                None => {
                    self.0.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(())
    }
}

impl IntoIterator for CounterValueCollection {
    type Item = (String, CounterValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, CounterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
