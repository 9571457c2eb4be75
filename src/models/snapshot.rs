// Labeled time-series point shared by every series the pipeline returns

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One point of a labeled time series: label -> value at `timestamp` (epoch ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<V> {
    pub timestamp: i64,
    pub values: BTreeMap<String, V>,
}

impl<V> Snapshot<V> {
    pub fn new(timestamp: i64, values: BTreeMap<String, V>) -> Self {
        Self { timestamp, values }
    }

    pub fn get(&self, label: &str) -> Option<&V> {
        self.values.get(label)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Snapshot<f64> {
    /// Average active sessions per label: occurrences / samples. Labels absent from
    /// `counts` get no entry. `samples` is never 0 here (rejected by `AshSnapshot::new`).
    pub fn normalized(timestamp: i64, counts: &BTreeMap<&str, u32>, samples: u32) -> Self {
        let samples = f64::from(samples);
        let values = counts
            .iter()
            .filter(|&(_, &n)| n > 0)
            .map(|(label, &n)| ((*label).to_string(), f64::from(n) / samples))
            .collect();
        Self { timestamp, values }
    }
}

/// Occurrence count per label.
pub fn count_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> BTreeMap<&'a str, u32> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}
