//! Tracks submitted units until the scheduler reports them terminal.
//!
//! Each unit moves through Submitted → Running → terminal. There is no
//! explicit Running signal; the transition out of Running is observed by
//! polling the scheduler's liveness query, after which the job log is
//! read once to classify the outcome.

use std::fmt;

use chrono::Utc;
use serde::Serialize;

use crate::error::EvexError;
use crate::ledger::{Ledger, LedgerEntry};
use crate::pairing::SubmissionUnit;
use crate::scheduler::{JobId, Scheduler};

/// Terminal classification of a finished job, derived from its log and
/// never stored anywhere but the wave summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    /// Log present and contains the success sentinel.
    Succeeded,
    /// Log present, sentinel absent: the worker ran and failed.
    Failed,
    /// Log missing or unreadable: the worker died silently. Retried like
    /// a failure but reported separately for operator visibility.
    Unknown,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Succeeded => write!(f, "succeeded"),
            JobOutcome::Failed => write!(f, "failed"),
            JobOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// A unit that has reached a terminal state.
#[derive(Debug, Clone)]
pub struct CompletedUnit {
    pub unit: SubmissionUnit,
    pub job_id: JobId,
    pub outcome: JobOutcome,
}

#[derive(Debug)]
struct InFlight {
    unit: SubmissionUnit,
    job_id: JobId,
}

/// Owns the in-flight set and the ledger.
///
/// Appends exactly one [`LedgerEntry`] per submission (never per poll);
/// that append is the process's only durability write.
pub struct JobTracker {
    ledger: Ledger,
    sentinel: String,
    in_flight: Vec<InFlight>,
    completed: Vec<CompletedUnit>,
}

impl JobTracker {
    pub fn new(ledger: Ledger, sentinel: String) -> Self {
        Self {
            ledger,
            sentinel,
            in_flight: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Records a fresh submission: one ledger line, then tracked until
    /// terminal.
    pub fn register(&mut self, unit: SubmissionUnit, job_id: JobId) -> Result<(), EvexError> {
        let entry = LedgerEntry::new(job_id.clone(), unit.keys(), Utc::now());
        self.ledger.append(&entry)?;
        self.in_flight.push(InFlight { unit, job_id });
        Ok(())
    }

    /// Tracks a unit whose submission was ledgered by a previous process
    /// (crash recovery). No new ledger line is written.
    pub fn adopt(&mut self, unit: SubmissionUnit, job_id: JobId) {
        self.in_flight.push(InFlight { unit, job_id });
    }

    /// Number of units submitted but not yet observed terminal.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Terminal units observed since the last take. Draining this is how
    /// the wave loop reports completions as they happen.
    pub fn take_completed(&mut self) -> Vec<CompletedUnit> {
        std::mem::take(&mut self.completed)
    }

    /// One pass over the in-flight set. Units whose job the scheduler no
    /// longer reports as running are classified from their log and moved
    /// to the completed list. A failed liveness query leaves the unit in
    /// flight for the next pass rather than guessing.
    pub async fn poll_once<S: Scheduler>(&mut self, scheduler: &S) -> usize {
        let mut observed = 0;
        let mut i = 0;
        while i < self.in_flight.len() {
            let running = scheduler.is_running(&self.in_flight[i].job_id).await;
            match running {
                Ok(true) | Err(_) => {
                    i += 1;
                }
                Ok(false) => {
                    let InFlight { unit, job_id } = self.in_flight.remove(i);
                    let outcome = self.classify(scheduler, &job_id);
                    self.completed.push(CompletedUnit {
                        unit,
                        job_id,
                        outcome,
                    });
                    observed += 1;
                }
            }
        }
        observed
    }

    /// Polls with a fixed backoff until nothing is in flight, invoking
    /// `on_complete` for each terminal unit as it is observed.
    pub async fn drain<S: Scheduler>(
        &mut self,
        scheduler: &S,
        poll_interval: std::time::Duration,
        mut on_complete: impl FnMut(&CompletedUnit),
    ) -> Vec<CompletedUnit> {
        let mut all = Vec::new();
        loop {
            self.poll_once(scheduler).await;
            for done in self.take_completed() {
                on_complete(&done);
                all.push(done);
            }
            if self.in_flight.is_empty() {
                return all;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    fn classify<S: Scheduler>(&self, scheduler: &S, job_id: &JobId) -> JobOutcome {
        let log_path = scheduler.log_path(job_id);
        match std::fs::read_to_string(&log_path) {
            Ok(log) if log.contains(&self.sentinel) => JobOutcome::Succeeded,
            Ok(_) => JobOutcome::Failed,
            Err(_) => JobOutcome::Unknown,
        }
    }
}
