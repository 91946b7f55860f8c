//! Metric capture helpers built on [`DebuggingRecorder`].

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Create a recorder and the snapshotter reading it.
#[must_use]
pub fn record_metrics() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Counter values captured by a single snapshot.
///
/// Taking a snapshot drains the recorder's counters, so take one after the
/// code under test has run and query it as often as needed.
#[derive(Debug, Default)]
pub struct Counters(Vec<(String, Vec<(String, String)>, u64)>);

impl Counters {
    /// Snapshot every counter currently held by `snapshotter`.
    #[must_use]
    pub fn capture(snapshotter: &Snapshotter) -> Self {
        let counters = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(count) => {
                    let labels = key
                        .key()
                        .labels()
                        .map(|l| (l.key().to_owned(), l.value().to_owned()))
                        .collect();
                    Some((key.key().name().to_owned(), labels, count))
                }
                _ => None,
            })
            .collect();
        Self(counters)
    }

    /// Sum of every counter named `name` whose labels include all of `labels`.
    #[must_use]
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.0
            .iter()
            .filter(|(counter, counter_labels, _)| {
                counter == name
                    && labels.iter().all(|(label, value)| {
                        counter_labels
                            .iter()
                            .any(|(k, v)| k == label && v == value)
                    })
            })
            .map(|(_, _, count)| count)
            .sum()
    }
}
