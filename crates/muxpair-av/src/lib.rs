//! # muxpair-av
//!
//! Everything that touches the external media binaries.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout and
//!   cancellation support for running external processes.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) -- stream kind, duration and
//!   resolution of a single file.
//! - **Muxing** ([`Muxer`], [`FfmpegMuxer`]) -- copy one video and one audio
//!   stream into a new container without re-encoding.
//! - **Output staging** ([`Workspace`]) -- write into a private directory and
//!   move into place only once the output is verified.
//! - **Templates** ([`TemplateContext`]) -- `{var}` substitution for output
//!   names.

pub mod command;
pub mod mux;
pub mod probe;
pub mod template;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use mux::{FfmpegMuxer, Muxer};
pub use probe::{FfprobeProber, Prober};
pub use template::TemplateContext;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;
