//! Shared test harness for integration tests.
//!
//! Provides a scripted [`FakeProber`] and [`FakeMuxer`] so the whole run
//! pipeline can be exercised without ffmpeg, plus helpers to lay out input
//! directories.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use muxpair::config::Config;
use muxpair::RunCoordinator;
use muxpair_av::{Muxer, Prober};
use muxpair_core::{Error, MediaFile, ProbeResult, Result, StreamKind};

// ---------------------------------------------------------------------------
// FakeProber
// ---------------------------------------------------------------------------

/// What the fake prober reports for a file name.
#[derive(Debug, Clone)]
pub enum Scripted {
    Media(StreamKind, f64),
    Fail(String),
}

/// Prober answering from a script keyed by file name.
///
/// Files missing from the script probe as [`StreamKind::Unknown`].
/// With a `delay`, each probe waits that long and honours cancellation.
#[derive(Default)]
pub struct FakeProber {
    script: HashMap<String, Scripted>,
    delay: Option<Duration>,
    pub calls: AtomicU32,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video(mut self, name: &str, duration: f64) -> Self {
        self.script
            .insert(name.into(), Scripted::Media(StreamKind::Video, duration));
        self
    }

    pub fn audio(mut self, name: &str, duration: f64) -> Self {
        self.script
            .insert(name.into(), Scripted::Media(StreamKind::Audio, duration));
        self
    }

    pub fn failing(mut self, name: &str, message: &str) -> Self {
        self.script
            .insert(name.into(), Scripted::Fail(message.into()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// File names the script knows about.
    pub fn names(&self) -> Vec<String> {
        self.script.keys().cloned().collect()
    }
}

#[async_trait]
impl Prober for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(
        &self,
        file: Arc<MediaFile>,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        let name = file_name(&file.path);
        match self.script.get(&name) {
            Some(Scripted::Media(kind, duration)) => Ok(ProbeResult {
                file,
                kind: *kind,
                duration: Some(*duration),
                resolution: None,
                error: None,
            }),
            Some(Scripted::Fail(message)) => Err(Error::probe_failed(&file.path, message.clone())),
            None => Ok(ProbeResult {
                file,
                kind: StreamKind::Unknown,
                duration: None,
                resolution: None,
                error: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeMuxer
// ---------------------------------------------------------------------------

/// Muxer that writes the concatenated sources to the output.
///
/// Pairs whose video file name is in `fail_videos` fail on every attempt.
/// With a `delay`, each invocation waits that long and honours cancellation.
#[derive(Default)]
pub struct FakeMuxer {
    fail_videos: HashSet<String>,
    delay: Option<Duration>,
    pub calls: AtomicU32,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FakeMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, video_name: &str) -> Self {
        self.fail_videos.insert(video_name.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of invocations made for the pair with this video file name.
    pub fn attempts_for(&self, video_name: &str) -> u32 {
        self.attempts.lock().get(video_name).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let video_name = file_name(video);
        *self.attempts.lock().entry(video_name.clone()).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        if self.fail_videos.contains(&video_name) {
            return Err(Error::MergeFailed(format!("scripted failure for {video_name}")));
        }

        let mut data = std::fs::read(video)?;
        data.extend(std::fs::read(audio)?);
        std::fs::write(output, data)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Create a temp dir containing one small file per name.
pub fn input_dir(names: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }
    dir
}

/// Config reading from `input` and writing to `output`.
pub fn config_for(input: &Path, output: &Path) -> Config {
    let mut config = Config::default();
    config.input_dirs = vec![input.to_path_buf()];
    config.output_dir = Some(output.to_path_buf());
    config
}

/// Build a coordinator over the fakes.
pub fn coordinator(
    config: Config,
    prober: FakeProber,
    muxer: Arc<FakeMuxer>,
) -> RunCoordinator {
    RunCoordinator::new(config, Arc::new(prober), muxer).unwrap()
}

/// Regular files currently in `dir`, by name, sorted.
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

pub fn paths(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| dir.join(n)).collect()
}
