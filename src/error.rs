use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvexError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors crossing the external-scheduler boundary.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Submission rejected: {0}")]
    Submit(String),

    #[error("Liveness query failed for job {job_id}: {message}")]
    Query { job_id: String, message: String },

    #[error("Failed to spawn scheduler command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unparseable scheduler output: {0}")]
    Parse(String),
}

impl SchedulerError {
    /// True for errors where retrying the same call later may succeed
    /// (the scheduler answered, just not usefully).
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::Query { .. } | SchedulerError::Submit(_))
    }
}
