//! Merge executor.
//!
//! Drives the [`Muxer`] for one pair: staged output, bounded retries and
//! source deletion once the output is confirmed on disk.

use muxpair_av::{Muxer, Workspace};
use muxpair_core::{Error, MergeOutcome, MergeStatus, Pair, Result};
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failure reason recorded for a pair interrupted by cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Runs merges for individual pairs.
///
/// Holds no per-pair state, so one executor is shared by every merge worker.
#[derive(Clone)]
pub struct MergeExecutor {
    muxer: Arc<dyn Muxer>,
    max_retries: u32,
    delete_sources: bool,
}

impl MergeExecutor {
    /// `max_retries` is the number of additional attempts after the first.
    pub fn new(muxer: Arc<dyn Muxer>, max_retries: u32, delete_sources: bool) -> Self {
        Self {
            muxer,
            max_retries,
            delete_sources,
        }
    }

    /// Merge `pair` into `output`.
    ///
    /// Never returns an error: every failure is recorded in the outcome.
    pub async fn execute(
        &self,
        pair: Pair,
        output: PathBuf,
        cancel: &CancellationToken,
    ) -> MergeOutcome {
        let max_attempts = self.max_retries.saturating_add(1);
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < max_attempts {
            if attempts > 0 && cancel.is_cancelled() {
                last_error = CANCELLED_REASON.to_string();
                break;
            }
            attempts += 1;

            match self.attempt(&pair, &output, cancel).await {
                Ok(()) => {
                    info!(
                        output = %output.display(),
                        attempts,
                        "Merge succeeded"
                    );
                    let deleted_sources = self.delete_sources && remove_sources(&pair, &output);
                    return MergeOutcome {
                        pair,
                        output,
                        status: MergeStatus::Success,
                        attempts,
                        deleted_sources,
                    };
                }
                Err(Error::Cancelled) => {
                    warn!(output = %output.display(), "Merge interrupted by cancellation");
                    last_error = CANCELLED_REASON.to_string();
                    break;
                }
                Err(e) => {
                    warn!(
                        output = %output.display(),
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "Merge attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        MergeOutcome {
            pair,
            output,
            status: MergeStatus::Failed { reason: last_error },
            attempts,
            deleted_sources: false,
        }
    }

    async fn attempt(&self, pair: &Pair, output: &Path, cancel: &CancellationToken) -> Result<()> {
        let (dir, file_name) = match (output.parent(), output.file_name()) {
            (Some(dir), Some(name)) => (dir, name.to_string_lossy().to_string()),
            _ => {
                return Err(Error::Internal(format!(
                    "invalid output path {}",
                    output.display()
                )))
            }
        };

        // Dropping the workspace on any early return discards partial output.
        let workspace = Workspace::new(dir, &file_name)?;
        debug!(
            muxer = self.muxer.name(),
            staged = %workspace.staged_path().display(),
            "Starting mux"
        );
        self.muxer
            .mux(
                pair.video.path(),
                pair.audio.path(),
                workspace.staged_path(),
                cancel,
            )
            .await?;
        workspace.finalize(output)?;
        Ok(())
    }
}

/// Delete both sources of a merged pair.
///
/// Re-checks that `output` exists and is non-empty first. Returns whether
/// both files are gone.
fn remove_sources(pair: &Pair, output: &Path) -> bool {
    match std::fs::metadata(output) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        _ => {
            warn!(
                output = %output.display(),
                "Output not confirmed on disk; keeping sources"
            );
            return false;
        }
    }

    let mut all_removed = true;
    for source in [pair.video.path(), pair.audio.path()] {
        match std::fs::remove_file(source) {
            Ok(()) => debug!(file = %source.display(), "Deleted source"),
            Err(e) => {
                warn!(file = %source.display(), error = %e, "Failed to delete source");
                all_removed = false;
            }
        }
    }
    all_removed
}
