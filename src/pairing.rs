//! Pairing of pending work items into submission units.
//!
//! The external worker accepts up to two drugs per scheduler job to
//! amortize its fixed startup cost, so consecutive pending items are
//! paired and an odd tail becomes a singleton.

use serde::Serialize;

use crate::catalog::WorkItem;

/// One or two work items bundled into a single scheduler submission.
///
/// The second slot being absent means a singleton unit; it is never a
/// duplicate of the first (processing the same drug twice in one job is
/// a defect, not a filler policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionUnit {
    pub first: WorkItem,
    pub second: Option<WorkItem>,
}

impl SubmissionUnit {
    /// The drug keys of this unit, in submission order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = vec![self.first.key.clone()];
        if let Some(second) = &self.second {
            keys.push(second.key.clone());
        }
        keys
    }

    /// Compact label for log lines, e.g. `aspirin+warfarin` or `zinc`.
    pub fn label(&self) -> String {
        self.keys().join("+")
    }
}

/// Groups an ordered item sequence into units of size ≤ 2.
///
/// Deterministic for a given input order; callers pass items already
/// sorted by key so runs are reproducible and diffable against the
/// ledger. An empty input yields an empty output, which is the wave
/// loop's termination signal.
pub fn pair(items: Vec<WorkItem>) -> Vec<SubmissionUnit> {
    let mut units = Vec::with_capacity(items.len().div_ceil(2));
    let mut iter = items.into_iter();
    while let Some(first) = iter.next() {
        units.push(SubmissionUnit {
            first,
            second: iter.next(),
        });
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(key: &str) -> WorkItem {
        WorkItem {
            key: key.to_string(),
            input_path: PathBuf::from(format!("data/{key}")),
            expected_output_path: PathBuf::from(format!("output/{key}.json")),
        }
    }

    #[test]
    fn pairs_consecutive_items() {
        let units = pair(vec![item("a"), item("b"), item("c"), item("d")]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].keys(), vec!["a", "b"]);
        assert_eq!(units[1].keys(), vec!["c", "d"]);
    }

    #[test]
    fn odd_tail_becomes_singleton() {
        let units = pair(vec![item("a"), item("b"), item("c")]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].keys(), vec!["a", "b"]);
        assert_eq!(units[1].keys(), vec!["c"]);
        assert!(units[1].second.is_none());
    }

    #[test]
    fn empty_input_yields_no_units() {
        assert!(pair(Vec::new()).is_empty());
    }

    #[test]
    fn single_item_is_a_singleton() {
        let units = pair(vec![item("only")]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].label(), "only");
    }

    #[test]
    fn pairing_is_deterministic() {
        let a = pair(vec![item("a"), item("b"), item("c")]);
        let b = pair(vec![item("a"), item("b"), item("c")]);
        assert_eq!(a, b);
    }

    #[test]
    fn label_joins_keys() {
        let units = pair(vec![item("aspirin"), item("warfarin")]);
        assert_eq!(units[0].label(), "aspirin+warfarin");
    }
}
