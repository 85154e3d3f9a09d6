//! FFprobe-based [`Prober`] implementation.
//!
//! Shells out to `ffprobe -v error -print_format json -show_format -show_streams`
//! and reduces the JSON to stream kind, duration and resolution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use muxpair_core::{Error, MediaFile, ProbeResult, Resolution, Result, StreamKind};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::Prober;
use crate::command::ToolCommand;

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
    kill_grace: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    ///
    /// On cancellation a running ffprobe gets `kill_grace` to exit before it
    /// is killed.
    pub fn new(ffprobe_path: PathBuf, timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
            kill_grace,
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(
        &self,
        file: Arc<MediaFile>,
        cancel: &CancellationToken,
    ) -> Result<ProbeResult> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout);
        cmd.cancel_on(cancel.clone(), self.kill_grace);
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(file.path.to_string_lossy().as_ref());

        let output = match cmd.execute().await {
            Ok(output) => output,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => return Err(Error::probe_failed(&file.path, e.to_string())),
        };

        let ff: FfprobeOutput = serde_json::from_str(&output.stdout)
            .map_err(|e| Error::probe_failed(&file.path, format!("ffprobe JSON parse error: {e}")))?;

        Ok(parse_ffprobe_output(file, &ff))
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

impl FfprobeStream {
    /// A real picture stream: non-zero dimensions and not embedded cover art.
    fn is_usable_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
            && self.width.unwrap_or(0) > 0
            && self.height.unwrap_or(0) > 0
            && self.disposition.attached_pic == 0
    }

    fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_ffprobe_output(file: Arc<MediaFile>, output: &FfprobeOutput) -> ProbeResult {
    let video = output.streams.iter().find(|s| s.is_usable_video());
    let has_audio = output.streams.iter().any(|s| s.is_audio());

    let kind = match (video, has_audio) {
        (Some(_), _) => StreamKind::Video,
        (None, true) => StreamKind::Audio,
        (None, false) => StreamKind::Unknown,
    };

    let resolution = video.map(|v| Resolution {
        width: v.width.unwrap_or(0),
        height: v.height.unwrap_or(0),
    });

    // Container duration first, then the first usable stream that has one.
    let duration = parse_duration(output.format.duration.as_deref()).or_else(|| {
        output
            .streams
            .iter()
            .filter(|s| s.is_usable_video() || s.is_audio())
            .find_map(|s| parse_duration(s.duration.as_deref()))
    });

    ProbeResult {
        file,
        kind,
        duration,
        resolution,
        error: None,
    }
}

fn parse_duration(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
