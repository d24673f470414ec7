//! The top-level control loop: waves of pair → submit → drain.
//!
//! One wave is one full pass over the currently pending set. Failed or
//! unknown units never write their output marker, so the next wave's
//! fresh catalog scan naturally re-includes exactly their keys.

use std::time::Duration;

use serde::Serialize;

use crate::catalog::WorkItemCatalog;
use crate::error::EvexError;
use crate::gate::{SubmissionGate, SubmitOutcome};
use crate::pairing::pair;
use crate::scheduler::Scheduler;
use crate::tracker::{CompletedUnit, JobOutcome, JobTracker};
use crate::ui::WaveUi;

/// Per-wave counts, reported after the wave drains.
#[derive(Debug, Clone, Serialize)]
pub struct WaveSummary {
    pub wave: u32,
    pub submitted: u32,
    pub rejected: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub unknown: u32,
}

impl WaveSummary {
    fn new(wave: u32) -> Self {
        Self {
            wave,
            submitted: 0,
            rejected: 0,
            succeeded: 0,
            failed: 0,
            unknown: 0,
        }
    }

    fn record(&mut self, done: &CompletedUnit) {
        match done.outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Unknown => self.unknown += 1,
        }
    }

    /// A clean wave needs no follow-up.
    pub fn all_clear(&self) -> bool {
        self.rejected == 0 && self.failed == 0 && self.unknown == 0
    }
}

/// Cumulative result of a run, printable as JSON for downstream tooling.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub waves: Vec<WaveSummary>,
    /// Keys still pending when the run stopped.
    pub remaining: Vec<String>,
    /// Keys excluded because their source data was unreadable.
    pub skipped: Vec<String>,
    /// True iff the pending set was empty at termination.
    pub complete: bool,
}

/// Drives waves until the pending set empties or the wave budget runs out.
pub struct WaveScheduler {
    max_waves: u32,
    max_concurrent: usize,
    poll_interval: Duration,
}

impl WaveScheduler {
    pub fn new(max_waves: u32, max_concurrent: usize, poll_interval: Duration) -> Self {
        Self {
            max_waves: max_waves.max(1),
            max_concurrent,
            poll_interval,
        }
    }

    /// Runs the wave loop. The tracker may arrive pre-loaded with adopted
    /// units from recovery; those are drained before the first wave so no
    /// key can be outstanding in two submissions at once.
    pub async fn run<S: Scheduler>(
        &self,
        catalog: &WorkItemCatalog,
        scheduler: &S,
        tracker: &mut JobTracker,
        ui: &WaveUi,
    ) -> Result<RunReport, EvexError> {
        let gate = SubmissionGate::new(self.max_concurrent, self.poll_interval);
        let mut waves = Vec::new();

        if tracker.in_flight() > 0 {
            ui.draining_adopted(tracker.in_flight());
            tracker
                .drain(scheduler, self.poll_interval, |done| ui.unit_done(done))
                .await;
        }

        for wave_no in 1..=self.max_waves {
            let scan = catalog.pending_items()?;
            ui.skipped_items(&scan.skipped);
            if scan.items.is_empty() {
                break;
            }

            let units = pair(scan.items);
            let mut summary = WaveSummary::new(wave_no);
            ui.wave_start(wave_no, self.max_waves, units.len());

            for unit in units {
                let label = unit.label();
                match gate.submit(tracker, scheduler, unit).await? {
                    SubmitOutcome::Submitted(job_id) => {
                        summary.submitted += 1;
                        ui.unit_submitted(&label, &job_id);
                    }
                    SubmitOutcome::Rejected(reason) => {
                        summary.rejected += 1;
                        ui.unit_rejected(&label, &reason);
                    }
                }
                for done in tracker.take_completed() {
                    ui.unit_done(&done);
                    summary.record(&done);
                }
            }

            let drained = tracker
                .drain(scheduler, self.poll_interval, |done| ui.unit_done(done))
                .await;
            for done in &drained {
                summary.record(done);
            }

            ui.wave_summary(&summary);
            waves.push(summary);
            // A clean wave falls through to the next scan, which decides
            // whether anything is actually left (markers may be missing).
        }

        // The report reflects the terminal scan, not the last wave's view.
        let final_scan = catalog.pending_items()?;
        let remaining: Vec<String> = final_scan.items.into_iter().map(|item| item.key).collect();
        Ok(RunReport {
            waves,
            complete: remaining.is_empty(),
            remaining,
            skipped: final_scan.skipped,
        })
    }
}
