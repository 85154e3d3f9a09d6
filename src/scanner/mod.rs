//! Inventory scanner.
//!
//! Lists candidate files directly inside the configured input directories.
//! Subdirectories are not descended into and symlinks are ignored.

use muxpair_core::{Error, MediaFile, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Case-insensitive extension allow-list.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    allowed: HashSet<String>,
}

impl ExtensionFilter {
    /// Build a filter from extensions given with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { allowed }
    }

    /// Lower-cased extension of `path` if it is allowed.
    pub fn matches(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        self.allowed.contains(&ext).then_some(ext)
    }
}

/// List the regular files directly in `dir` whose extension passes `filter`.
///
/// Returned paths are absolute and sorted.
///
/// # Errors
///
/// [`Error::DirectoryUnreadable`] if `dir` does not exist, is not a
/// directory, or cannot be listed.
pub fn scan_dir(dir: &Path, filter: &ExtensionFilter) -> Result<Vec<MediaFile>> {
    let unreadable = |source: io::Error| Error::directory_unreadable(dir, source);

    let root = dir.canonicalize().map_err(unreadable)?;
    if !root.is_dir() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => return Err(unreadable(e.into())),
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(extension) = filter.matches(path) else {
            continue;
        };

        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping file without metadata");
                continue;
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        files.push(MediaFile {
            path: path.to_path_buf(),
            size,
            extension,
            base_name: base_name(&stem),
        });
    }

    debug!(dir = %root.display(), count = files.len(), "Scanned directory");
    Ok(files)
}

/// Describe a single file outside of a directory scan.
pub fn describe_file(path: &Path) -> io::Result<MediaFile> {
    let path = path.canonicalize()?;
    let size = std::fs::metadata(&path)?.len();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(MediaFile {
        base_name: base_name(&stem),
        path,
        size,
        extension,
    })
}

/// Scan every directory in `dirs` and merge the results.
///
/// A file reachable through more than one configured directory appears once.
/// The first unreadable directory aborts the whole scan.
pub fn scan_all(dirs: &[PathBuf], filter: &ExtensionFilter) -> Result<Vec<MediaFile>> {
    let mut by_path: BTreeMap<PathBuf, MediaFile> = BTreeMap::new();
    for dir in dirs {
        for file in scan_dir(dir, filter)? {
            by_path.entry(file.path.clone()).or_insert(file);
        }
    }
    Ok(by_path.into_values().collect())
}

fn suffix_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)_bilibili(_\d+(_\d+)?)?$",
            r"(?i)(_audio|_video|_aud|_vid|_track\d+|_a\d+|_v\d+)$",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Strip downloader suffixes from a file stem.
///
/// `lecture_bilibili_1_2` and `lecture_audio` both become `lecture`. Falls
/// back to the untouched stem if stripping would leave nothing.
pub fn base_name(stem: &str) -> String {
    let mut name = stem.to_string();
    for re in suffix_patterns() {
        name = re.replace(&name, "").into_owned();
    }
    let name = name.trim();
    if name.is_empty() {
        stem.to_string()
    } else {
        name.to_string()
    }
}
