//! Bounds the number of scheduler submissions in flight.
//!
//! The gate never trusts local bookkeeping alone: while it waits for a
//! slot it drives the tracker's liveness polls, so the outstanding count
//! is re-derived from the scheduler's own answers. A process restart
//! therefore cannot leave the gate believing in slots that do not exist.

use std::time::Duration;

use crate::error::EvexError;
use crate::pairing::SubmissionUnit;
use crate::scheduler::{JobId, Scheduler, SubmitSpec};
use crate::tracker::JobTracker;

/// What became of one submission attempt.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The scheduler accepted the unit and assigned a job id.
    Submitted(JobId),
    /// The scheduler refused; the unit's keys stay pending and the wave
    /// summary counts the rejection. The ledger is not advanced.
    Rejected(String),
}

/// Gate over concurrent in-flight submissions.
pub struct SubmissionGate {
    max: usize,
    poll_interval: Duration,
}

impl SubmissionGate {
    pub fn new(max: usize, poll_interval: Duration) -> Self {
        // A budget of zero would deadlock the first submission.
        Self {
            max: max.max(1),
            poll_interval,
        }
    }

    /// Submits one unit, blocking (poll + sleep) until the in-flight
    /// count drops below the budget. Terminal observations made while
    /// waiting land in the tracker's completed list for the caller to
    /// report.
    pub async fn submit<S: Scheduler>(
        &self,
        tracker: &mut JobTracker,
        scheduler: &S,
        unit: SubmissionUnit,
    ) -> Result<SubmitOutcome, EvexError> {
        while tracker.in_flight() >= self.max {
            let freed = tracker.poll_once(scheduler).await;
            if freed == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        let spec = SubmitSpec { keys: unit.keys() };
        match scheduler.submit(&spec).await {
            Ok(job_id) => {
                tracker.register(unit, job_id.clone())?;
                Ok(SubmitOutcome::Submitted(job_id))
            }
            // A rejection is retryable: the keys stay pending. A spawn or
            // parse fault means every further submission would fail the
            // same way, so it escalates.
            Err(e) if e.is_transient() => Ok(SubmitOutcome::Rejected(e.to_string())),
            Err(e) => Err(EvexError::Scheduler(e)),
        }
    }
}
