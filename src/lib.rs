//! muxpair - pair separately downloaded audio and video streams and mux them
//!
//! The library exposes the run pipeline so it can be driven headlessly:
//! [`scanner`] inventories input directories, [`matcher`] pairs probed files,
//! [`naming`] decides output paths, [`merge`] runs the mux tool per pair and
//! [`run`] ties the stages together behind a [`RunCoordinator`].

pub mod config;
pub mod matcher;
pub mod merge;
pub mod naming;
pub mod run;
pub mod scanner;

pub use run::{RunCoordinator, RunHandle};
