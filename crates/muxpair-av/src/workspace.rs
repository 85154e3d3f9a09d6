//! Staging area for mux output.

use muxpair_core::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Hidden prefix for staging directories created inside the output directory.
const STAGING_PREFIX: &str = ".muxpair-";

/// Private directory the mux tool writes into.
///
/// The directory lives inside the output directory so the final move is a
/// same-filesystem rename. Dropping the workspace without calling
/// [`Workspace::finalize`] removes the directory and any partial output.
///
/// # Example
///
/// ```no_run
/// use muxpair_av::Workspace;
/// use std::path::Path;
///
/// let ws = Workspace::new(Path::new("/out"), "1.ATM.mp4")?;
/// // ... mux into ws.staged_path() ...
/// ws.finalize(Path::new("/out/1.ATM.mp4"))?;
/// # Ok::<(), muxpair_core::Error>(())
/// ```
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
    staged_path: PathBuf,
}

impl Workspace {
    /// Create a staging directory in `output_dir` for a file named `file_name`.
    pub fn new(output_dir: &Path, file_name: &str) -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(output_dir)?;
        let staged_path = temp_dir.path().join(file_name);

        Ok(Self {
            temp_dir,
            staged_path,
        })
    }

    /// Where the mux tool should write.
    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    /// Path of the staging directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Verify the staged output and move it to `dest`.
    ///
    /// Fails with [`Error::MergeFailed`] if the staged file is missing or
    /// empty, or if `dest` already exists.
    pub fn finalize(self, dest: &Path) -> Result<PathBuf> {
        let len = match std::fs::metadata(&self.staged_path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(Error::MergeFailed(format!(
                    "output file was not produced: {}",
                    self.staged_path.display()
                )))
            }
        };
        if len == 0 {
            return Err(Error::MergeFailed("output file is empty".into()));
        }
        if dest.exists() {
            return Err(Error::MergeFailed(format!(
                "refusing to overwrite existing file {}",
                dest.display()
            )));
        }

        std::fs::rename(&self.staged_path, dest).map_err(|e| {
            Error::MergeFailed(format!("failed to move output into place: {e}"))
        })?;

        Ok(dest.to_path_buf())
    }
}
