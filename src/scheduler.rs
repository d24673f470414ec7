//! Boundary to the external cluster scheduler.
//!
//! The core never sees raw scheduler text: all parsing of `sbatch` and
//! `squeue` output is confined to [`SlurmScheduler`]. Everything above
//! this module works with [`JobId`] and [`SubmitSpec`] values only.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::SchedulerError;

/// Opaque scheduler-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What one scheduler submission carries: one or two drug keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSpec {
    pub keys: Vec<String>,
}

/// The three operations the orchestrator needs from a cluster scheduler.
///
/// `submit` must be idempotent-safe to retry on error (no partial side
/// effect on failure); `is_running` is eventually consistent and safe to
/// call at arbitrary frequency.
pub trait Scheduler {
    async fn submit(&self, spec: &SubmitSpec) -> Result<JobId, SchedulerError>;
    async fn is_running(&self, job_id: &JobId) -> Result<bool, SchedulerError>;
    /// Deterministic location of the job's log artifact.
    fn log_path(&self, job_id: &JobId) -> PathBuf;
}

/// Slurm adapter: shells out to `sbatch`/`squeue` and parses their text.
pub struct SlurmScheduler {
    sbatch_cmd: String,
    squeue_cmd: String,
    worker_script: PathBuf,
    log_dir: PathBuf,
}

impl SlurmScheduler {
    pub fn new(
        sbatch_cmd: String,
        squeue_cmd: String,
        worker_script: PathBuf,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            sbatch_cmd,
            squeue_cmd,
            worker_script,
            log_dir,
        }
    }

    /// Extracts the job id from sbatch stdout, expected to end with
    /// `Submitted batch job <id>`.
    fn parse_sbatch_output(stdout: &str) -> Result<JobId, SchedulerError> {
        stdout
            .split_whitespace()
            .last()
            .filter(|tok| !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()))
            .map(JobId::new)
            .ok_or_else(|| SchedulerError::Parse(format!("unexpected sbatch output: {stdout:?}")))
    }
}

impl Scheduler for SlurmScheduler {
    async fn submit(&self, spec: &SubmitSpec) -> Result<JobId, SchedulerError> {
        let log_pattern = self.log_dir.join("slurm-%j.out");
        let output = Command::new(&self.sbatch_cmd)
            .arg(format!("--output={}", log_pattern.display()))
            .arg(&self.worker_script)
            .args(&spec.keys)
            .output()
            .await
            .map_err(|e| SchedulerError::Spawn {
                command: self.sbatch_cmd.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(SchedulerError::Submit(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Self::parse_sbatch_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn is_running(&self, job_id: &JobId) -> Result<bool, SchedulerError> {
        let output = Command::new(&self.squeue_cmd)
            .args(["-h", "-j", job_id.as_str()])
            .output()
            .await
            .map_err(|e| SchedulerError::Spawn {
                command: self.squeue_cmd.clone(),
                source: e,
            })?;

        if output.status.success() {
            return Ok(!output.stdout.iter().all(|b| b.is_ascii_whitespace()));
        }

        // squeue rejects ids it no longer knows about; that means the job
        // left the queue, not that the query infrastructure is down.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Invalid job id") {
            return Ok(false);
        }
        Err(SchedulerError::Query {
            job_id: job_id.to_string(),
            message: stderr.trim().to_string(),
        })
    }

    fn log_path(&self, job_id: &JobId) -> PathBuf {
        self.log_dir.join(format!("slurm-{job_id}.out"))
    }
}

/// Writes the worker's completion marker the way the real extraction
/// worker does. Exposed for the fake below and for tests.
#[cfg(test)]
fn write_marker(dir: &std::path::Path, key: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(
        dir.join(format!("{key}.json")),
        format!("{{\"drug\": \"{key}\", \"indications\": []}}"),
    )
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-memory scheduler used across the orchestration tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// What the fake worker does when a key is submitted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Behavior {
        /// Write the output marker and a log containing the sentinel.
        Succeed,
        /// Write a log without the sentinel and no marker.
        FailNoSentinel,
        /// Write nothing at all (worker crashed silently).
        NoLog,
        /// Reject the whole submission at submit time.
        RejectSubmit,
    }

    struct FakeJob {
        keys: Vec<String>,
        /// How many more liveness polls report the job as running.
        polls_left: u32,
        /// Write markers and a sentinel log when the poll count runs out
        /// (jobs created via `submit` already wrote theirs).
        finish_on_last_poll: bool,
    }

    struct FakeState {
        next_id: u64,
        jobs: HashMap<String, FakeJob>,
        /// Per-key behavior queues; popped front on each submission.
        scripts: HashMap<String, Vec<Behavior>>,
        /// Every accepted submission's keys, in order.
        submissions: Vec<Vec<String>>,
        outstanding: usize,
        max_outstanding: usize,
    }

    /// Fake scheduler that executes the scripted behavior at submit time
    /// and reports jobs as running for a configurable number of polls.
    pub struct FakeScheduler {
        log_dir: PathBuf,
        marker_dir: PathBuf,
        polls_until_done: u32,
        state: Mutex<FakeState>,
    }

    impl FakeScheduler {
        pub fn new(log_dir: impl Into<PathBuf>, marker_dir: impl Into<PathBuf>) -> Self {
            Self {
                log_dir: log_dir.into(),
                marker_dir: marker_dir.into(),
                polls_until_done: 0,
                state: Mutex::new(FakeState {
                    next_id: 1000,
                    jobs: HashMap::new(),
                    scripts: HashMap::new(),
                    submissions: Vec::new(),
                    outstanding: 0,
                    max_outstanding: 0,
                }),
            }
        }

        /// Makes every job survive `n` liveness polls before terminating.
        pub fn with_polls_until_done(mut self, n: u32) -> Self {
            self.polls_until_done = n;
            self
        }

        /// Queue a behavior for the next submission containing `key`.
        /// Unspecified keys succeed.
        pub fn script(&self, key: &str, behavior: Behavior) {
            let mut state = self.state.lock().unwrap();
            state
                .scripts
                .entry(key.to_string())
                .or_default()
                .push(behavior);
        }

        /// Registers a job as if it had been submitted by an earlier
        /// orchestrator process, running until `finish_job` is called.
        pub fn preexisting_job(&self, id: &str, keys: &[&str]) -> JobId {
            let mut state = self.state.lock().unwrap();
            state.jobs.insert(
                id.to_string(),
                FakeJob {
                    keys: keys.iter().map(|k| k.to_string()).collect(),
                    polls_left: u32::MAX,
                    finish_on_last_poll: false,
                },
            );
            JobId::new(id)
        }

        /// Registers a job from an earlier orchestrator process that stays
        /// alive for `polls` liveness polls and then terminates
        /// successfully (markers plus sentinel log).
        pub fn preexisting_job_finishing_after(
            &self,
            id: &str,
            keys: &[&str],
            polls: u32,
        ) -> JobId {
            let mut state = self.state.lock().unwrap();
            state.jobs.insert(
                id.to_string(),
                FakeJob {
                    keys: keys.iter().map(|k| k.to_string()).collect(),
                    polls_left: polls,
                    finish_on_last_poll: true,
                },
            );
            JobId::new(id)
        }

        /// Terminates a pre-existing job successfully: markers, sentinel log.
        pub fn finish_job(&self, id: &JobId) {
            let mut state = self.state.lock().unwrap();
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                job.polls_left = 0;
                let keys = job.keys.clone();
                drop(state);
                for key in &keys {
                    write_marker(&self.marker_dir, key).unwrap();
                }
                self.write_log(id, true);
            }
        }

        pub fn submissions(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().submissions.clone()
        }

        pub fn submission_count(&self) -> usize {
            self.state.lock().unwrap().submissions.len()
        }

        /// Highest number of jobs simultaneously alive in the fake queue.
        pub fn max_outstanding(&self) -> usize {
            self.state.lock().unwrap().max_outstanding
        }

        fn write_log(&self, id: &JobId, with_sentinel: bool) {
            std::fs::create_dir_all(&self.log_dir).unwrap();
            let body = if with_sentinel {
                "worker starting\nEXTRACTION COMPLETE\n"
            } else {
                "worker starting\ntraceback: extraction blew up\n"
            };
            std::fs::write(self.log_path(id), body).unwrap();
        }

        fn take_behavior(state: &mut FakeState, keys: &[String]) -> Behavior {
            for key in keys {
                if let Some(queue) = state.scripts.get_mut(key) {
                    if !queue.is_empty() {
                        return queue.remove(0);
                    }
                }
            }
            Behavior::Succeed
        }
    }

    impl Scheduler for FakeScheduler {
        async fn submit(&self, spec: &SubmitSpec) -> Result<JobId, SchedulerError> {
            let mut state = self.state.lock().unwrap();
            let behavior = Self::take_behavior(&mut state, &spec.keys);
            if behavior == Behavior::RejectSubmit {
                return Err(SchedulerError::Submit("queue refused the job".into()));
            }

            state.next_id += 1;
            let id = JobId::new(state.next_id.to_string());
            state.submissions.push(spec.keys.clone());
            state.jobs.insert(
                id.as_str().to_string(),
                FakeJob {
                    keys: spec.keys.clone(),
                    polls_left: self.polls_until_done,
                    finish_on_last_poll: false,
                },
            );
            state.outstanding += 1;
            state.max_outstanding = state.max_outstanding.max(state.outstanding);
            drop(state);

            // The fake worker runs to completion at submit time; only the
            // liveness answer is delayed by polls_until_done.
            match behavior {
                Behavior::Succeed => {
                    for key in &spec.keys {
                        write_marker(&self.marker_dir, key)
                            .map_err(|e| SchedulerError::Submit(e.to_string()))?;
                    }
                    self.write_log(&id, true);
                }
                Behavior::FailNoSentinel => self.write_log(&id, false),
                Behavior::NoLog => {}
                Behavior::RejectSubmit => unreachable!(),
            }
            Ok(id)
        }

        async fn is_running(&self, job_id: &JobId) -> Result<bool, SchedulerError> {
            let mut finish_keys: Option<Vec<String>> = None;
            let mut state = self.state.lock().unwrap();
            let running = match state.jobs.get_mut(job_id.as_str()) {
                Some(job) if job.polls_left > 0 => {
                    if job.polls_left != u32::MAX {
                        job.polls_left -= 1;
                        if job.polls_left == 0 {
                            if job.finish_on_last_poll {
                                finish_keys = Some(job.keys.clone());
                            }
                            state.outstanding = state.outstanding.saturating_sub(1);
                        }
                    }
                    true
                }
                Some(_) => {
                    state.outstanding = state.outstanding.saturating_sub(1);
                    false
                }
                None => false,
            };
            drop(state);

            if let Some(keys) = finish_keys {
                for key in &keys {
                    write_marker(&self.marker_dir, key).unwrap();
                }
                self.write_log(job_id, true);
            }
            Ok(running)
        }

        fn log_path(&self, job_id: &JobId) -> PathBuf {
            self.log_dir.join(format!("slurm-{job_id}.out"))
        }
    }
}
