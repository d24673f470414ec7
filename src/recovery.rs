//! Restart reconciliation: replay the ledger against the scheduler and
//! the output markers.
//!
//! Reconciliation writes nothing. Keys whose last job died without a
//! marker are already naturally pending; the point here is to tell the
//! operator "tried and failed" apart from "never tried", and to hand
//! still-live jobs back to the tracker so they are drained instead of
//! resubmitted.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{WorkItem, WorkItemCatalog};
use crate::error::EvexError;
use crate::ledger::Ledger;
use crate::pairing::SubmissionUnit;
use crate::scheduler::{JobId, Scheduler};

/// A ledgered job the scheduler still reports as running.
#[derive(Debug, Clone, Serialize)]
pub struct LiveJob {
    pub job_id: JobId,
    pub keys: Vec<String>,
}

/// What the ledger replay found.
#[derive(Debug, Default, Serialize)]
pub struct RecoveryReport {
    /// Keys whose most recent job is dead and whose marker is absent.
    pub tried_and_failed: Vec<String>,
    /// Jobs from the ledger that survived the orchestrator restart.
    pub still_running: Vec<LiveJob>,
    /// Keys whose marker exists (nothing to do).
    pub already_complete: usize,
    /// Ledger lines that did not parse.
    pub malformed_lines: usize,
}

impl RecoveryReport {
    /// Builds adoptable units for the still-running jobs so the wave
    /// scheduler drains them before pairing anything. The items are
    /// reconstructed from the catalog's naming conventions; only keys
    /// without a marker are worth tracking.
    pub fn adoptable_units(&self, catalog: &WorkItemCatalog) -> Vec<(JobId, SubmissionUnit)> {
        self.still_running
            .iter()
            .filter_map(|live| {
                let mut items = live.keys.iter().map(|key| WorkItem {
                    key: key.clone(),
                    input_path: catalog.data_dir().join(key),
                    expected_output_path: catalog.output_path_for(key),
                });
                let first = items.next()?;
                Some((
                    live.job_id.clone(),
                    SubmissionUnit {
                        first,
                        second: items.next(),
                    },
                ))
            })
            .collect()
    }
}

/// Replays the ledger newest-first, checking each key's most recent job
/// against the scheduler and the output markers. Appends nothing.
pub async fn reconcile<S: Scheduler>(
    ledger: &Ledger,
    catalog: &WorkItemCatalog,
    scheduler: &S,
) -> Result<RecoveryReport, EvexError> {
    let contents = ledger.read_all()?;
    let mut report = RecoveryReport {
        malformed_lines: contents.malformed_lines,
        ..Default::default()
    };

    // Only a key's most recent submission matters; older entries for the
    // same key are superseded history.
    let mut seen: HashSet<String> = HashSet::new();
    for entry in contents.entries.iter().rev() {
        let fresh: Vec<String> = entry
            .keys
            .iter()
            .filter(|k| seen.insert((*k).clone()))
            .cloned()
            .collect();
        if fresh.is_empty() {
            continue;
        }

        let incomplete: Vec<String> = fresh
            .iter()
            .filter(|k| !catalog.key_is_complete(k))
            .cloned()
            .collect();
        report.already_complete += fresh.len() - incomplete.len();
        if incomplete.is_empty() {
            continue;
        }

        // A flaky liveness answer errs toward "running": adoption is
        // safe because the first poll re-checks before classifying.
        let running = scheduler
            .is_running(&entry.job_id)
            .await
            .unwrap_or(true);
        if running {
            report.still_running.push(LiveJob {
                job_id: entry.job_id.clone(),
                keys: incomplete,
            });
        } else {
            report.tried_and_failed.extend(incomplete);
        }
    }

    report.tried_and_failed.sort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::ledger::LedgerEntry;
    use crate::scheduler::testing::FakeScheduler;
    use std::fs;
    use std::path::Path;

    fn catalog(dir: &Path) -> WorkItemCatalog {
        WorkItemCatalog::new(dir.join("drugs"), dir.join("output"), Variant::Naive)
    }

    fn ledger_with(dir: &Path, entries: &[(&str, &[&str])]) -> Ledger {
        let ledger = Ledger::new(dir.join("ledger.txt"));
        for (job, keys) in entries {
            ledger
                .append(&LedgerEntry::new(
                    JobId::new(*job),
                    keys.iter().map(|k| k.to_string()).collect(),
                    chrono::Utc::now(),
                ))
                .unwrap();
        }
        ledger
    }

    fn write_marker(catalog: &WorkItemCatalog, key: &str) {
        let path = catalog.output_path_for(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"{}").unwrap();
    }

    #[tokio::test]
    async fn dead_job_without_marker_is_tried_and_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new(tmp.path().join("logs"), tmp.path().join("output/naive"));
        let catalog = catalog(tmp.path());
        let ledger = ledger_with(tmp.path(), &[("100", &["aspirin", "warfarin"])]);

        let report = reconcile(&ledger, &catalog, &fake).await.unwrap();
        assert_eq!(report.tried_and_failed, vec!["aspirin", "warfarin"]);
        assert!(report.still_running.is_empty());
        assert_eq!(report.already_complete, 0);
    }

    #[tokio::test]
    async fn completed_keys_need_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new(tmp.path().join("logs"), tmp.path().join("output/naive"));
        let catalog = catalog(tmp.path());
        write_marker(&catalog, "aspirin");
        write_marker(&catalog, "warfarin");
        let ledger = ledger_with(tmp.path(), &[("100", &["aspirin", "warfarin"])]);

        let report = reconcile(&ledger, &catalog, &fake).await.unwrap();
        assert!(report.tried_and_failed.is_empty());
        assert_eq!(report.already_complete, 2);
    }

    #[tokio::test]
    async fn live_job_is_reported_not_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new(tmp.path().join("logs"), tmp.path().join("output/naive"));
        fake.preexisting_job("200", &["zinc"]);
        let catalog = catalog(tmp.path());
        let ledger = ledger_with(tmp.path(), &[("200", &["zinc"])]);

        let report = reconcile(&ledger, &catalog, &fake).await.unwrap();
        assert!(report.tried_and_failed.is_empty());
        assert_eq!(report.still_running.len(), 1);
        assert_eq!(report.still_running[0].keys, vec!["zinc"]);

        let units = report.adoptable_units(&catalog);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].1.label(), "zinc");
        assert_eq!(
            units[0].1.first.expected_output_path,
            catalog.output_path_for("zinc")
        );
    }

    #[tokio::test]
    async fn only_the_latest_entry_per_key_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new(tmp.path().join("logs"), tmp.path().join("output/naive"));
        let catalog = catalog(tmp.path());
        // "aspirin" was submitted twice; only job 102 is its current fate.
        let ledger = ledger_with(
            tmp.path(),
            &[("101", &["aspirin", "warfarin"]), ("102", &["aspirin"])],
        );

        let report = reconcile(&ledger, &catalog, &fake).await.unwrap();
        assert_eq!(report.tried_and_failed, vec!["aspirin", "warfarin"]);
        // Two dead jobs, but each key reported once.
        assert_eq!(report.tried_and_failed.len(), 2);
    }

    #[tokio::test]
    async fn empty_ledger_reconciles_to_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = FakeScheduler::new(tmp.path().join("logs"), tmp.path().join("output/naive"));
        let catalog = catalog(tmp.path());
        let ledger = Ledger::new(tmp.path().join("ledger.txt"));

        let report = reconcile(&ledger, &catalog, &fake).await.unwrap();
        assert!(report.tried_and_failed.is_empty());
        assert!(report.still_running.is_empty());
        assert_eq!(report.malformed_lines, 0);
    }
}
