//! Command-line interface, built on clap.
//!
//! Three subcommands: `run` drives waves to completion or budget
//! exhaustion, `status` reports counts without submitting anything, and
//! `resume` reconciles the ledger before running.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// EVEX — wave orchestrator for drug-indication evidence extraction.
#[derive(Debug, Parser)]
#[command(name = "evex", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (default: ./evex.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum number of scheduler jobs in flight at once.
    #[arg(long, global = true)]
    pub max_jobs: Option<usize>,

    /// Total wave budget (first attempt plus retries).
    #[arg(long, global = true)]
    pub max_waves: Option<u32>,

    /// Suppress spinner and per-unit output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit pending work in waves until done or out of budget.
    Run,

    /// Report pending/completed/running counts. Submits nothing.
    Status {
        /// Emit the status as JSON instead of styled text.
        #[arg(long)]
        json: bool,
    },

    /// Reconcile the ledger after a crash or restart, then run.
    Resume,
}
