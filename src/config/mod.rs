//! Configuration file loading.
//!
//! The configuration types live in [`muxpair_core::config`]; this module
//! finds, reads and validates the TOML file.

pub use muxpair_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Locations searched by [`load_config_or_default`], in order.
pub const DEFAULT_PATHS: &[&str] = &["./muxpair.toml", "~/.config/muxpair/config.toml"];

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Load config from `custom_path`, else from the default locations, else
/// return the default config.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Expand a leading `~` in every configured directory.
fn expand_paths(config: &mut Config) {
    let expand = |p: &Path| -> std::path::PathBuf {
        shellexpand::tilde(&p.to_string_lossy()).into_owned().into()
    };

    for dir in &mut config.input_dirs {
        *dir = expand(dir.as_path());
    }
    if let Some(dir) = config.output_dir.as_mut() {
        *dir = expand(dir.as_path());
    }
    if let Some(p) = config.tools.ffmpeg_path.as_mut() {
        *p = expand(p.as_path());
    }
    if let Some(p) = config.tools.ffprobe_path.as_mut() {
        *p = expand(p.as_path());
    }
}
