mod catalog;
mod cli;
mod config;
mod error;
mod gate;
mod ledger;
mod pairing;
mod recovery;
mod scheduler;
mod tracker;
mod ui;
mod wave;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use catalog::WorkItemCatalog;
use cli::{Cli, Command};
use config::EvexConfig;
use ledger::Ledger;
use recovery::LiveJob;
use scheduler::SlurmScheduler;
use tracker::JobTracker;
use ui::WaveUi;
use wave::WaveScheduler;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = EvexConfig::load(cli.config.as_deref())?;
    if let Some(n) = cli.max_jobs {
        config.max_concurrent = n;
    }
    if let Some(n) = cli.max_waves {
        config.max_waves = n;
    }

    let catalog = WorkItemCatalog::new(
        config.data_dir.clone(),
        config.output_dir.clone(),
        config.variant,
    );
    let scheduler = SlurmScheduler::new(
        config.sbatch_cmd.clone(),
        config.squeue_cmd.clone(),
        config.worker_script.clone(),
        config.log_dir.clone(),
    );
    match cli.command {
        command @ (Command::Run | Command::Resume) => {
            let ui = if cli.quiet {
                WaveUi::quiet()
            } else {
                WaveUi::new()
            };
            let reconcile_first = matches!(command, Command::Resume);
            run(&config, &catalog, &scheduler, &ui, reconcile_first).await
        }
        Command::Status { json } => status(&config, &catalog, &scheduler, json).await,
    }
}

/// Drives the wave loop; with `reconcile_first` it replays the ledger and
/// adopts still-running jobs before the first wave.
async fn run(
    config: &EvexConfig,
    catalog: &WorkItemCatalog,
    scheduler: &SlurmScheduler,
    ui: &WaveUi,
    reconcile_first: bool,
) -> Result<ExitCode> {
    let mut tracker = JobTracker::new(
        Ledger::new(config.ledger_path.clone()),
        config.sentinel.clone(),
    );

    if reconcile_first {
        let ledger = Ledger::new(config.ledger_path.clone());
        let report = recovery::reconcile(&ledger, catalog, scheduler).await?;
        ui.recovery_report(&report);
        for (job_id, unit) in report.adoptable_units(catalog) {
            tracker.adopt(unit, job_id);
        }
    }

    let waves = WaveScheduler::new(
        config.max_waves,
        config.max_concurrent,
        config.poll_interval(),
    );
    let report = waves.run(catalog, scheduler, &mut tracker, ui).await?;
    ui.run_report(&report);

    if report.complete {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Read-only snapshot of the pipeline: never submits, never writes.
#[derive(Debug, Serialize)]
struct StatusReport {
    total: usize,
    completed: usize,
    pending: usize,
    skipped: Vec<String>,
    running: Vec<LiveJob>,
    tried_and_failed: Vec<String>,
}

async fn status(
    config: &EvexConfig,
    catalog: &WorkItemCatalog,
    scheduler: &SlurmScheduler,
    json: bool,
) -> Result<ExitCode> {
    let scan = catalog.all_items()?;
    let completed = scan.items.iter().filter(|i| i.is_complete()).count();

    let ledger = Ledger::new(config.ledger_path.clone());
    let recon = recovery::reconcile(&ledger, catalog, scheduler).await?;

    let report = StatusReport {
        total: scan.items.len(),
        completed,
        pending: scan.items.len() - completed,
        skipped: scan.skipped,
        running: recon.still_running,
        tried_and_failed: recon.tried_and_failed,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} total, {} completed, {} pending, {} running job(s)",
            report.total,
            report.completed,
            report.pending,
            report.running.len()
        );
        if !report.skipped.is_empty() {
            println!("excluded (unreadable): {}", report.skipped.join(", "));
        }
        if !report.tried_and_failed.is_empty() {
            println!("tried and failed: {}", report.tried_and_failed.join(", "));
        }
        for live in &report.running {
            println!("job {} running ({})", live.job_id, live.keys.join("+"));
        }
    }

    // Same contract as run: clean exit means nothing left to do.
    if report.pending == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
