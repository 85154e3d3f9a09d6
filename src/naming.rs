//! Output path computation.
//!
//! Template variables:
//!
//! | Variable      | Value                                         |
//! |---------------|-----------------------------------------------|
//! | `{idx}`       | 1-based pair index within the run              |
//! | `{num}`       | index zero-padded to three digits              |
//! | `{timestamp}` | run start time in the configured format        |
//! | `{date}`      | run start date, `%Y%m%d`                       |
//! | `{time}`      | run start time, `%H%M`                         |
//! | `{name}`      | base name of the video file                    |
//! | `{video}`     | file stem of the video source                  |
//! | `{audio}`     | file stem of the audio source                  |

use chrono::{DateTime, Local};
use muxpair_av::TemplateContext;
use muxpair_core::config::NamingConfig;
use muxpair_core::{Error, Pair, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Highest numeric suffix tried before giving up on a name.
pub const MAX_SUFFIX: u32 = 9999;

const FALLBACK_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H.%M";

/// Hands out unique output paths for one run.
///
/// A path is unique if no file exists there and no earlier pair of the same
/// run was given it.
#[derive(Debug)]
pub struct OutputNamer {
    output_dir: PathBuf,
    template: String,
    extension: String,
    timestamp: String,
    date: String,
    time: String,
    reserved: HashSet<PathBuf>,
    max_suffix: u32,
}

impl OutputNamer {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        naming: &NamingConfig,
        container: &str,
        run_time: DateTime<Local>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            template: naming.template.clone(),
            extension: container.trim().trim_start_matches('.').to_string(),
            timestamp: format_time(&run_time, &naming.timestamp_format),
            date: format_time(&run_time, "%Y%m%d"),
            time: format_time(&run_time, "%H%M"),
            reserved: HashSet::new(),
            max_suffix: MAX_SUFFIX,
        }
    }

    /// Override the suffix bound.
    pub fn with_max_suffix(mut self, max_suffix: u32) -> Self {
        self.max_suffix = max_suffix;
        self
    }

    /// Directory every output is placed in.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the file name for the `index`-th pair, without collision handling.
    pub fn render(&self, index: usize, pair: &Pair) -> String {
        let video = &pair.video.file;
        let audio = &pair.audio.file;
        let name = if video.base_name.is_empty() {
            "video".to_string()
        } else {
            video.base_name.clone()
        };

        let ctx = TemplateContext::new()
            .with_var("idx", index.to_string())
            .with_var("num", format!("{index:03}"))
            .with_var("timestamp", self.timestamp.as_str())
            .with_var("date", self.date.as_str())
            .with_var("time", self.time.as_str())
            .with_var("name", name)
            .with_var("video", video.stem())
            .with_var("audio", audio.stem());

        let mut rendered: String = ctx
            .substitute(&self.template)
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let trimmed = rendered.trim();
        if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
            rendered = index.to_string();
        }

        let suffix = format!(".{}", self.extension);
        if !self.extension.is_empty()
            && !rendered.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
        {
            rendered.push_str(&suffix);
        }
        rendered
    }

    /// Reserve a unique output path for the `index`-th pair.
    ///
    /// # Errors
    ///
    /// [`Error::OutputPathCollision`] once every suffix up to the bound is
    /// taken.
    pub fn next_path(&mut self, index: usize, pair: &Pair) -> Result<PathBuf> {
        let file_name = self.render(index, pair);
        let first = self.output_dir.join(&file_name);
        if self.is_free(&first) {
            self.reserved.insert(first.clone());
            return Ok(first);
        }

        let (stem, ext) = split_extension(&file_name);
        for n in 1..=self.max_suffix {
            let candidate = self.output_dir.join(format!("{stem}_{n}{ext}"));
            if self.is_free(&candidate) {
                tracing::debug!(
                    wanted = %first.display(),
                    chosen = %candidate.display(),
                    "Output name taken; using suffix"
                );
                self.reserved.insert(candidate.clone());
                return Ok(candidate);
            }
        }

        Err(Error::OutputPathCollision {
            path: first,
            attempts: self.max_suffix,
        })
    }

    fn is_free(&self, path: &Path) -> bool {
        !self.reserved.contains(path) && !path.exists()
    }
}

/// Split `name` into stem and `.ext`; the extension part may be empty.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

fn format_time(time: &DateTime<Local>, fmt: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", time.format(fmt)).is_ok() {
        return out;
    }
    tracing::warn!(format = fmt, "Invalid timestamp format; using default");
    time.format(FALLBACK_TIMESTAMP_FORMAT).to_string()
}
