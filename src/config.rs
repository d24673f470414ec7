//! EVEX configuration loaded from `evex.toml`.
//!
//! The [`EvexConfig`] struct holds every tunable the orchestrator needs.
//! Fields absent from the file fall back to defaults; CLI flags override
//! the file after loading.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which extraction variant this run drives. The variant only changes the
/// output naming convention; the orchestration loop is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Direct LLM prompt-completion extraction.
    Naive,
    /// DrugBank relational lookup.
    Drugbank,
    /// PubMed-abstract-sourced extraction.
    Pubmed,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Naive => "naive",
            Variant::Drugbank => "drugbank",
            Variant::Pubmed => "pubmed",
        }
    }
}

/// Top-level configuration loaded from `evex.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct EvexConfig {
    /// Directory containing one entry per drug (the work-item universe).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root directory for extraction output markers.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory where the cluster scheduler writes job logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Path of the append-only submission ledger.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Worker script handed to the scheduler with one or two drug keys.
    #[serde(default = "default_worker_script")]
    pub worker_script: PathBuf,

    /// Extraction variant (selects the output naming convention).
    #[serde(default = "default_variant")]
    pub variant: Variant,

    /// Maximum number of scheduler jobs in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Total wave budget (first attempt plus retries).
    #[serde(default = "default_max_waves")]
    pub max_waves: u32,

    /// Seconds between scheduler liveness polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Substring in a job log that marks successful completion.
    #[serde(default = "default_sentinel")]
    pub sentinel: String,

    /// Command used to submit jobs.
    #[serde(default = "default_sbatch_cmd")]
    pub sbatch_cmd: String,

    /// Command used to query job liveness.
    #[serde(default = "default_squeue_cmd")]
    pub squeue_cmd: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/drugs")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("evex-ledger.txt")
}

fn default_worker_script() -> PathBuf {
    PathBuf::from("scripts/extract_worker.sh")
}

fn default_variant() -> Variant {
    Variant::Naive
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_waves() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_sentinel() -> String {
    "EXTRACTION COMPLETE".to_string()
}

fn default_sbatch_cmd() -> String {
    "sbatch".to_string()
}

fn default_squeue_cmd() -> String {
    "squeue".to_string()
}

impl Default for EvexConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            ledger_path: default_ledger_path(),
            worker_script: default_worker_script(),
            variant: default_variant(),
            max_concurrent: default_max_concurrent(),
            max_waves: default_max_waves(),
            poll_interval_secs: default_poll_interval_secs(),
            sentinel: default_sentinel(),
            sbatch_cmd: default_sbatch_cmd(),
            squeue_cmd: default_squeue_cmd(),
        }
    }
}

impl EvexConfig {
    /// Loads the configuration from the given path, or `evex.toml` in the
    /// current directory when `path` is `None`. A missing file yields the
    /// defaults; a present but malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new("evex.toml"));
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config = toml::from_str::<EvexConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = EvexConfig::default();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_waves, 5);
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.sentinel, "EXTRACTION COMPLETE");
        assert_eq!(config.variant, Variant::Naive);
        assert_eq!(config.sbatch_cmd, "sbatch");
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            data_dir = "/cluster/drugs"
            max_concurrent = 8
            variant = "drugbank"
        "#;
        let config: EvexConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/cluster/drugs"));
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.variant, Variant::Drugbank);
        assert_eq!(config.max_waves, 5);
        assert_eq!(config.sentinel, "EXTRACTION COMPLETE");
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EvexConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.max_waves, 5);
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evex.toml");
        std::fs::write(&path, "max_concurrent = \"many\"").unwrap();
        assert!(EvexConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn variant_names() {
        assert_eq!(Variant::Naive.as_str(), "naive");
        assert_eq!(Variant::Drugbank.as_str(), "drugbank");
        assert_eq!(Variant::Pubmed.as_str(), "pubmed");
    }
}
