use clap::{Args, Parser, Subcommand};
use muxpair::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "muxpair")]
#[command(author, version, about = "Pair separate audio and video downloads and mux them")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan, pair and merge every video/audio pair in the input directories
    Run(RunArgs),

    /// Probe a media file and display its stream kind and duration
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Input directory (repeatable)
    #[arg(short, long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Output directory (defaults to the first input directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Largest accepted duration difference in seconds
    #[arg(long)]
    pub max_diff: Option<f64>,

    /// Number of concurrent probes
    #[arg(long)]
    pub probe_workers: Option<usize>,

    /// Number of concurrent merges
    #[arg(long)]
    pub merge_workers: Option<usize>,

    /// Additional attempts after a failed merge
    #[arg(long)]
    pub retries: Option<u32>,

    /// Delete both source files after a verified merge
    #[arg(long)]
    pub delete_sources: bool,

    /// Output name template, e.g. "{num}_{name}"
    #[arg(long)]
    pub template: Option<String>,

    /// Comma-separated extension allow-list
    #[arg(long, value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Pair and name outputs without merging anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Layer command-line flags over file configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if !self.inputs.is_empty() {
            config.input_dirs = self.inputs.clone();
        }
        if let Some(ref output) = self.output {
            config.output_dir = Some(output.clone());
        }
        if let Some(diff) = self.max_diff {
            config.matching.max_duration_diff = diff;
        }
        if let Some(n) = self.probe_workers {
            config.concurrency.probe_workers = n;
        }
        if let Some(n) = self.merge_workers {
            config.concurrency.merge_workers = n;
        }
        if let Some(n) = self.retries {
            config.merge.max_retries = n;
            config.merge.retry_on_failure = true;
        }
        if self.delete_sources {
            config.merge.delete_sources = true;
        }
        if let Some(ref template) = self.template {
            config.naming.template = template.clone();
        }
        if let Some(ref extensions) = self.extensions {
            config.scan.extensions = extensions.clone();
        }
        config.dry_run = self.dry_run;
    }
}
