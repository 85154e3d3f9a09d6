//! Per-run data model.
//!
//! Everything here is created during a single run and is immutable once
//! produced. Probe results are shared between the matcher, the merge
//! executor and the final report through [`Arc`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// MediaFile
// ---------------------------------------------------------------------------

/// A candidate file found by the inventory scanner. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Lower-cased extension without the leading dot.
    pub extension: String,
    /// File stem with downloader suffixes stripped, used for output naming.
    pub base_name: String,
}

impl MediaFile {
    /// Directory containing the file.
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// File stem as a lossy string.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ProbeResult
// ---------------------------------------------------------------------------

/// What a file carries, as far as pairing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Unknown,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Video frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Probe outcome for one [`MediaFile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The probed file.
    pub file: Arc<MediaFile>,
    /// Inferred stream kind.
    pub kind: StreamKind,
    /// Duration in seconds, absent when the tool reported none.
    pub duration: Option<f64>,
    /// Resolution of the primary video stream.
    pub resolution: Option<Resolution>,
    /// Probe failure message; set only for files that could not be probed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    /// Record a probe failure: the file is treated as [`StreamKind::Unknown`].
    pub fn failed(file: Arc<MediaFile>, error: impl Into<String>) -> Self {
        Self {
            file,
            kind: StreamKind::Unknown,
            duration: None,
            resolution: None,
            error: Some(error.into()),
        }
    }

    /// Path of the probed file.
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Duration usable for matching: present, finite and positive.
    pub fn usable_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }
}

// ---------------------------------------------------------------------------
// Pair
// ---------------------------------------------------------------------------

/// One video-only and one audio-only file judged to belong together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub video: Arc<ProbeResult>,
    pub audio: Arc<ProbeResult>,
    /// Absolute duration difference in seconds; lower is better.
    pub score: f64,
}

// ---------------------------------------------------------------------------
// MergeOutcome
// ---------------------------------------------------------------------------

/// Final status of one pair's merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MergeStatus {
    Success,
    Failed { reason: String },
    /// Never dispatched (cancellation or dry run).
    Skipped,
}

impl MergeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MergeStatus::Success)
    }
}

/// Result of merging one [`Pair`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub pair: Pair,
    pub output: PathBuf,
    #[serde(flatten)]
    pub status: MergeStatus,
    /// Number of mux tool invocations made for this pair.
    pub attempts: u32,
    /// Whether both source files were removed after a verified success.
    pub deleted_sources: bool,
}

impl MergeOutcome {
    /// An outcome for a pair that was never handed to the mux tool.
    pub fn skipped(pair: Pair, output: PathBuf) -> Self {
        Self {
            pair,
            output,
            status: MergeStatus::Skipped,
            attempts: 0,
            deleted_sources: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RunState / RunReport
// ---------------------------------------------------------------------------

/// Run coordinator state machine.
///
/// `Idle -> Scanning -> Probing -> Matching -> Merging -> Done`, with
/// `Cancelled` reachable from any non-terminal state and `Failed` reachable
/// only from `Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Scanning,
    Probing,
    Matching,
    Merging,
    Done,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Cancelled | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Scanning => "scanning",
            RunState::Probing => "probing",
            RunState::Matching => "matching",
            RunState::Merging => "merging",
            RunState::Done => "done",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything a run produced, handed to the caller read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Terminal state the run ended in.
    pub state: RunState,
    /// Outcomes in pair-submission order.
    pub outcomes: Vec<MergeOutcome>,
    /// Probe results that ended up in no pair, including probe failures.
    pub unmatched: Vec<Arc<ProbeResult>>,
    /// Fatal error message; only set when `state` is [`RunState::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, MergeStatus::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == MergeStatus::Skipped)
            .count()
    }
}
