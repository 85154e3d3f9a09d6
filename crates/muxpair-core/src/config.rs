//! Run configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML by the binary and then
//! handed explicitly to the run coordinator. Every section defaults sensibly
//! so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories scanned (non-recursively) for candidate files.
    pub input_dirs: Vec<PathBuf>,
    /// Where merged files are written. Defaults to the first input directory.
    pub output_dir: Option<PathBuf>,
    /// Stop after naming; record every pair as skipped.
    #[serde(skip)]
    pub dry_run: bool,
    pub scan: ScanConfig,
    pub matching: MatchingConfig,
    pub concurrency: ConcurrencyConfig,
    pub merge: MergeConfig,
    pub naming: NamingConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Output directory actually used by a run.
    pub fn effective_output_dir(&self) -> Option<PathBuf> {
        self.output_dir
            .clone()
            .or_else(|| self.input_dirs.first().cloned())
    }

    /// Retry budget after applying `retry_on_failure`.
    pub fn effective_retries(&self) -> u32 {
        if self.merge.retry_on_failure {
            self.merge.max_retries
        } else {
            0
        }
    }

    /// Reject settings no run could work with.
    pub fn validate(&self) -> Result<()> {
        let diff = self.matching.max_duration_diff;
        if !diff.is_finite() || diff < 0.0 {
            return Err(Error::Config(format!(
                "matching.max_duration_diff must be a non-negative number, got {diff}"
            )));
        }
        if self.concurrency.probe_workers == 0 {
            return Err(Error::Config("concurrency.probe_workers must be at least 1".into()));
        }
        if self.concurrency.merge_workers == 0 {
            return Err(Error::Config("concurrency.merge_workers must be at least 1".into()));
        }
        if self.scan.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(Error::Config("scan.extensions must not be empty".into()));
        }
        if self.naming.template.trim().is_empty() {
            return Err(Error::Config("naming.template must not be empty".into()));
        }
        if self.merge.container.trim().is_empty() {
            return Err(Error::Config("merge.container must not be empty".into()));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.input_dirs.is_empty() {
            warnings.push("no input_dirs configured; a run will find nothing".into());
        }
        for (i, dir) in self.input_dirs.iter().enumerate() {
            if !dir.is_dir() {
                warnings.push(format!("input_dirs[{i}] {} is not a directory", dir.display()));
            }
        }
        if self.merge.delete_sources && self.merge.max_retries == 0 {
            warnings.push("delete_sources is enabled with no retries".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Inventory scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Allowed extensions, case-insensitive, with or without a leading dot.
    pub extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "m4s", "mp4", "m4a", "aac", "flv", "f4v", "ts", "mkv", "webm", "mov", "avi",
                "mp3", "wav", "ogg", "opus",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Matcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest accepted duration difference between paired files, in seconds.
    pub max_duration_diff: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_duration_diff: 5.0,
        }
    }
}

/// Worker pool sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub probe_workers: usize,
    pub merge_workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            probe_workers: 4,
            merge_workers: 4,
        }
    }
}

/// Merge executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// When `false`, `max_retries` is ignored and each pair is tried once.
    pub retry_on_failure: bool,
    /// Remove both sources after a verified successful merge.
    pub delete_sources: bool,
    /// Output container extension, e.g. `mp4` or `mkv`.
    pub container: String,
    /// Maximum runtime of a single probe or mux invocation.
    pub tool_timeout_secs: u64,
    /// How long an in-flight tool may keep running after cancellation.
    pub kill_grace_secs: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_on_failure: true,
            delete_sources: false,
            container: "mp4".into(),
            tool_timeout_secs: 300,
            kill_grace_secs: 5,
        }
    }
}

/// Output naming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Output name template; see the naming module for variables.
    pub template: String,
    /// `chrono` format string for `{timestamp}`.
    pub timestamp_format: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            template: "{idx}.ATM_{timestamp}".into(),
            timestamp_format: "%Y_%m_%d_%H.%M".into(),
        }
    }
}

/// Paths to external tools, overriding `PATH` lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}
