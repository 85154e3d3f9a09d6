//! File probing.
//!
//! The [`Prober`] trait is the seam between the run coordinator and the
//! external probe tool. [`FfprobeProber`] is the production implementation;
//! tests substitute scripted probers.

pub mod ffprobe;

pub use self::ffprobe::FfprobeProber;

use async_trait::async_trait;
use muxpair_core::{MediaFile, ProbeResult, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns a [`MediaFile`] into a [`ProbeResult`].
///
/// Implementations hold no shared mutable state and may be called
/// concurrently for independent files.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe one file.
    ///
    /// # Errors
    ///
    /// Returns [`muxpair_core::Error::ProbeFailed`] if the tool exits non-zero
    /// or its output cannot be parsed, and [`muxpair_core::Error::Cancelled`]
    /// if `cancel` fired before the tool finished.
    async fn probe(&self, file: Arc<MediaFile>, cancel: &CancellationToken) -> Result<ProbeResult>;
}
