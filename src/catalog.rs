//! Work-item enumeration and pending-set computation.
//!
//! The catalog is the only component that decides what still needs doing.
//! It is re-scanned fresh at the start of every wave, so any output marker
//! that appeared in the meantime (including from a manually re-run job) is
//! picked up without special handling.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Variant;
use crate::error::EvexError;

/// One unit of extractable work: a single drug.
///
/// The existence of a non-empty file at `expected_output_path` is the sole
/// proof of completion. There is no separate done-database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Stable identifier — the drug's directory name under the data dir.
    pub key: String,
    /// Location of the drug's source data.
    pub input_path: PathBuf,
    /// Deterministic output marker location for this key.
    pub expected_output_path: PathBuf,
}

impl WorkItem {
    /// A completed item has a non-empty output marker on disk.
    pub fn is_complete(&self) -> bool {
        match std::fs::metadata(&self.expected_output_path) {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }
}

/// Result of a full catalog scan: the usable items plus the keys of entries
/// that could not be read (reported once, never fatal).
#[derive(Debug, Default)]
pub struct CatalogScan {
    pub items: Vec<WorkItem>,
    pub skipped: Vec<String>,
}

/// Enumerates the work-item universe and diffs it against output markers.
#[derive(Debug, Clone)]
pub struct WorkItemCatalog {
    data_dir: PathBuf,
    output_dir: PathBuf,
    variant: Variant,
}

impl WorkItemCatalog {
    pub fn new(data_dir: PathBuf, output_dir: PathBuf, variant: Variant) -> Self {
        Self {
            data_dir,
            output_dir,
            variant,
        }
    }

    /// Output marker path for a key. The variant is the only variation
    /// point between the naive, drugbank, and pubmed pipelines.
    pub fn output_path_for(&self, key: &str) -> PathBuf {
        self.output_dir
            .join(self.variant.as_str())
            .join(format!("{key}.json"))
    }

    /// Scans the data directory and returns every work item, sorted
    /// lexicographically by key so that pairing is reproducible and
    /// ledger lines are diffable across runs.
    ///
    /// An individual unreadable entry is skipped and recorded; a missing
    /// or unreadable data directory is fatal.
    pub fn all_items(&self) -> Result<CatalogScan, EvexError> {
        let entries = std::fs::read_dir(&self.data_dir).map_err(|e| {
            EvexError::Catalog(format!(
                "cannot read data dir {}: {e}",
                self.data_dir.display()
            ))
        })?;

        let mut scan = CatalogScan::default();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    scan.skipped.push(format!("<unreadable entry: {e}>"));
                    continue;
                }
            };
            let key = match entry.file_name().into_string() {
                Ok(k) => k,
                Err(name) => {
                    scan.skipped.push(name.to_string_lossy().into_owned());
                    continue;
                }
            };
            // Hidden files are scratch, not drugs.
            if key.starts_with('.') {
                continue;
            }
            match entry.metadata() {
                Ok(_) => scan.items.push(WorkItem {
                    expected_output_path: self.output_path_for(&key),
                    input_path: entry.path(),
                    key,
                }),
                Err(_) => scan.skipped.push(key),
            }
        }

        scan.items.sort_by(|a, b| a.key.cmp(&b.key));
        scan.skipped.sort();
        Ok(scan)
    }

    /// The items whose output marker does not yet exist, in key order.
    pub fn pending_items(&self) -> Result<CatalogScan, EvexError> {
        let mut scan = self.all_items()?;
        scan.items.retain(|item| !item.is_complete());
        Ok(scan)
    }

    /// True when a non-empty output marker exists for the key.
    pub fn key_is_complete(&self, key: &str) -> bool {
        let path = self.output_path_for(key);
        match std::fs::metadata(&path) {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
