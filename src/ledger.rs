//! Append-only submission ledger.
//!
//! One line per submission, `jobId : key1 : key2 : timestamp`, with a
//! literal `-` in the second slot for singleton units. The append is the
//! only write ever performed; the file doubles as an operator-readable
//! audit trail and the durability mechanism across restarts.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EvexError;
use crate::scheduler::JobId;

const ABSENT_KEY: &str = "-";

/// One immutable record per scheduler submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub job_id: JobId,
    pub keys: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(job_id: JobId, keys: Vec<String>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            keys,
            submitted_at,
        }
    }

    fn render(&self) -> String {
        let key1 = self.keys.first().map(String::as_str).unwrap_or(ABSENT_KEY);
        let key2 = self.keys.get(1).map(String::as_str).unwrap_or(ABSENT_KEY);
        format!(
            "{} : {} : {} : {}",
            self.job_id,
            key1,
            key2,
            self.submitted_at.to_rfc3339()
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(" : ");
        let job_id = fields.next()?.trim();
        let key1 = fields.next()?.trim();
        let key2 = fields.next()?.trim();
        let stamp = fields.next()?.trim();
        if fields.next().is_some() || job_id.is_empty() || key1 == ABSENT_KEY {
            return None;
        }
        let submitted_at = DateTime::parse_from_rfc3339(stamp).ok()?.with_timezone(&Utc);
        let mut keys = vec![key1.to_string()];
        if key2 != ABSENT_KEY {
            keys.push(key2.to_string());
        }
        Some(Self {
            job_id: JobId::new(job_id),
            keys,
            submitted_at,
        })
    }
}

/// The entries read back from disk plus how many lines did not parse.
#[derive(Debug, Default)]
pub struct LedgerContents {
    pub entries: Vec<LedgerEntry>,
    pub malformed_lines: usize,
}

/// Handle on the on-disk ledger file.
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Appends one entry and flushes. Never rewrites existing lines.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), EvexError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.render())?;
        file.flush()?;
        Ok(())
    }

    /// Reads every entry in file order. A missing file is an empty
    /// ledger; malformed lines are counted and skipped, never repaired.
    pub fn read_all(&self) -> Result<LedgerContents, EvexError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerContents::default());
            }
            Err(e) => {
                return Err(EvexError::Ledger(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let mut contents = LedgerContents::default();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match LedgerEntry::parse(line) {
                Some(entry) => contents.entries.push(entry),
                None => contents.malformed_lines += 1,
            }
        }
        Ok(contents)
    }
}
