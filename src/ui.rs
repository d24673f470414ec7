//! Terminal output — spinner and colored wave reporting.
//!
//! Uses `indicatif` for the drain spinner and `console` for styling.
//! Everything funnels through [`WaveUi`] so the orchestration core never
//! prints directly, and tests can run with a quiet instance.

use std::cell::Cell;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::recovery::RecoveryReport;
use crate::tracker::{CompletedUnit, JobOutcome};
use crate::wave::{RunReport, WaveSummary};

pub struct WaveUi {
    quiet: bool,
    pb: Option<ProgressBar>,
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
    skipped_shown: Cell<bool>,
}

impl WaveUi {
    /// UI for an interactive run: spinner plus colored lines.
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self {
            quiet: false,
            pb: Some(pb),
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            cyan: Style::new().cyan(),
            skipped_shown: Cell::new(false),
        }
    }

    /// Silent UI for tests and `--quiet` runs.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            pb: None,
            green: Style::new(),
            red: Style::new(),
            yellow: Style::new(),
            cyan: Style::new(),
            skipped_shown: Cell::new(false),
        }
    }

    fn println(&self, line: String) {
        if self.quiet {
            return;
        }
        match &self.pb {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        }
    }

    pub fn wave_start(&self, wave: u32, max_waves: u32, units: usize) {
        self.println(format!(
            "{} wave {wave}/{max_waves}: {units} unit(s) to submit",
            self.cyan.apply_to("▶")
        ));
        if let Some(pb) = &self.pb {
            pb.set_message(format!("wave {wave}: submitting"));
        }
    }

    pub fn draining_adopted(&self, count: usize) {
        self.println(format!(
            "{} draining {count} job(s) adopted from a previous run",
            self.yellow.apply_to("↻")
        ));
    }

    /// Reported once per run, on the first wave that sees them.
    pub fn skipped_items(&self, skipped: &[String]) {
        if skipped.is_empty() || self.skipped_shown.replace(true) {
            return;
        }
        self.println(format!(
            "{} {} item(s) excluded (unreadable source data): {}",
            self.yellow.apply_to("!"),
            skipped.len(),
            skipped.join(", ")
        ));
    }

    pub fn unit_submitted(&self, label: &str, job_id: &crate::scheduler::JobId) {
        self.println(format!("  submitted {label} as job {job_id}"));
    }

    pub fn unit_rejected(&self, label: &str, reason: &str) {
        self.println(format!(
            "  {} rejected {label}: {reason}",
            self.yellow.apply_to("↩")
        ));
    }

    pub fn unit_done(&self, done: &CompletedUnit) {
        let (mark, style) = match done.outcome {
            JobOutcome::Succeeded => ("✓", &self.green),
            JobOutcome::Failed => ("✗", &self.red),
            JobOutcome::Unknown => ("?", &self.yellow),
        };
        self.println(format!(
            "  {} job {} ({}) {}",
            style.apply_to(mark),
            done.job_id,
            done.unit.label(),
            done.outcome
        ));
    }

    pub fn wave_summary(&self, summary: &WaveSummary) {
        let style = if summary.all_clear() {
            &self.green
        } else {
            &self.yellow
        };
        self.println(format!(
            "{} wave {}: {} submitted, {} succeeded, {} failed, {} unknown, {} rejected",
            style.apply_to("■"),
            summary.wave,
            summary.submitted,
            summary.succeeded,
            summary.failed,
            summary.unknown,
            summary.rejected
        ));
    }

    pub fn recovery_report(&self, report: &RecoveryReport) {
        if self.quiet {
            return;
        }
        if report.malformed_lines > 0 {
            self.println(format!(
                "{} {} malformed ledger line(s) skipped",
                self.yellow.apply_to("!"),
                report.malformed_lines
            ));
        }
        self.println(format!(
            "reconciled ledger: {} complete, {} tried-and-failed, {} still running",
            report.already_complete,
            report.tried_and_failed.len(),
            report.still_running.len()
        ));
        if !report.tried_and_failed.is_empty() {
            self.println(format!(
                "  tried and failed: {}",
                report.tried_and_failed.join(", ")
            ));
        }
        for live in &report.still_running {
            self.println(format!(
                "  job {} still running ({})",
                live.job_id,
                live.keys.join("+")
            ));
        }
    }

    /// Final styled report; the JSON body feeds downstream tooling.
    pub fn run_report(&self, report: &RunReport) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
        if self.quiet {
            return;
        }
        let header = if report.complete {
            self.green.apply_to("─── Run complete ───")
        } else {
            self.red.apply_to("─── Run incomplete ───")
        };
        println!();
        println!("{header}");
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
        if !report.complete {
            eprintln!(
                "{} {} item(s) still pending: {}",
                self.red.apply_to("✗"),
                report.remaining.len(),
                report.remaining.join(", ")
            );
        }
    }
}

impl Default for WaveUi {
    fn default() -> Self {
        Self::new()
    }
}
