//! muxpair-core: shared types, errors, configuration, and run events.
//!
//! This crate is the foundational dependency for the other muxpair crates.
//! It holds the per-run data model ([`MediaFile`], [`ProbeResult`], [`Pair`],
//! [`MergeOutcome`], [`RunReport`]), the unified error type, the run
//! configuration, and the broadcast event bus used to report progress.

pub mod config;
pub mod error;
pub mod events;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventBus, RunEvent};
pub use media::*;
