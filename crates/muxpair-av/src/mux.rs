//! Stream-copy muxing of one video and one audio file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use muxpair_core::{Error, Result};
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;

/// Combines a video-only and an audio-only file into one container.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Human-readable name identifying this muxer implementation.
    fn name(&self) -> &'static str;

    /// Write the muxed result to `output`.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fired and the tool did not
    /// finish within its grace period, and [`Error::MergeFailed`] for every
    /// other failure.
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// A muxer backed by the `ffmpeg` CLI using stream copy.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    timeout: Duration,
    kill_grace: Duration,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
            kill_grace,
        }
    }

    fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(video.to_string_lossy().to_string());
        args.push("-i".into());
        args.push(audio.to_string_lossy().to_string());
        args.extend(
            ["-map", "0:v:0", "-map", "1:a:0", "-c", "copy"]
                .iter()
                .map(|s| s.to_string()),
        );

        let is_mp4 = output
            .extension()
            .map(|e| {
                let e = e.to_string_lossy().to_ascii_lowercase();
                e == "mp4" || e == "m4v" || e == "mov"
            })
            .unwrap_or(false);
        if is_mp4 {
            args.extend(["-movflags", "+faststart"].iter().map(|s| s.to_string()));
        }

        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::debug!(
            video = %video.display(),
            audio = %audio.display(),
            output = %output.display(),
            "ffmpeg stream copy"
        );

        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.timeout(self.timeout);
        cmd.cancel_on(cancel.clone(), self.kill_grace);
        cmd.args(Self::build_args(video, audio, output));

        match cmd.execute().await {
            Ok(_) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => Err(Error::MergeFailed(e.to_string())),
        }
    }
}
