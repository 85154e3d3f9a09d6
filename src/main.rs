mod cli;

use muxpair::{config, run, scanner, RunCoordinator};
use muxpair_av::{FfmpegMuxer, FfprobeProber, Muxer, Prober, ToolRegistry};
use muxpair_core::{MergeStatus, RunEvent, RunReport, RunState};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, RunArgs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "muxpair=debug,muxpair_av=trace,muxpair_core=debug".to_string()
        } else {
            "muxpair=info,muxpair_av=info,muxpair_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_batch(args, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("muxpair {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn tool_timeout(config: &config::Config) -> Duration {
    Duration::from_secs(config.merge.tool_timeout_secs)
}

fn kill_grace(config: &config::Config) -> Duration {
    Duration::from_secs(config.merge.kill_grace_secs)
}

async fn run_batch(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    args.apply_to(&mut config);

    if config.input_dirs.is_empty() {
        anyhow::bail!("No input directory given; use --input or set input_dirs in the config");
    }

    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?;
    let prober: Arc<dyn Prober> = Arc::new(FfprobeProber::new(
        ffprobe.path.clone(),
        tool_timeout(&config),
        kill_grace(&config),
    ));

    // A dry run never invokes the mux tool, so a missing ffmpeg is fine there.
    let ffmpeg_path = match tools.require("ffmpeg") {
        Ok(tool) => tool.path.clone(),
        Err(e) if config.dry_run => {
            tracing::debug!("{e}; continuing dry run");
            PathBuf::from("ffmpeg")
        }
        Err(e) => return Err(e.into()),
    };
    let muxer: Arc<dyn Muxer> = Arc::new(FfmpegMuxer::new(
        ffmpeg_path,
        tool_timeout(&config),
        kill_grace(&config),
    ));

    let json = args.json;
    let coordinator = RunCoordinator::new(config, prober, muxer)?;
    let mut events = coordinator.subscribe();
    let handle = coordinator.start();

    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling; waiting for running tools to stop...");
            token.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if matches!(event.payload, RunEvent::RunComplete { .. }) {
                        break;
                    }
                    if !json {
                        print_event(&event.payload);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "Progress output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = handle.wait().await?;
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.state == RunState::Failed {
        anyhow::bail!(
            "Run failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::ScanComplete { files } => println!("Found {} candidate files", files),
        RunEvent::ProbeComplete {
            path,
            kind,
            duration,
        } => match duration {
            Some(d) => println!("  probed {} ({}, {:.2}s)", path.display(), kind, d),
            None => println!("  probed {} ({})", path.display(), kind),
        },
        RunEvent::ProbeFailed { path, error } => {
            println!("  probe failed {}: {}", path.display(), error)
        }
        RunEvent::MatchComplete { pairs, unmatched } => {
            println!("Matched {} pairs, {} files unmatched", pairs, unmatched)
        }
        RunEvent::MergeComplete {
            index,
            output,
            attempts,
        } => println!(
            "  [{}] merged -> {} ({} attempt{})",
            index,
            output.display(),
            attempts,
            if *attempts == 1 { "" } else { "s" }
        ),
        RunEvent::MergeFailed {
            index,
            output,
            attempts,
            error,
        } => println!(
            "  [{}] FAILED {} after {} attempts: {}",
            index,
            output.display(),
            attempts,
            error
        ),
        RunEvent::StateChanged { .. } | RunEvent::RunComplete { .. } => {}
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("Run {}", report.state);
    if let Some(ref error) = report.error {
        println!("  Error: {}", error);
    }
    println!(
        "  Succeeded: {}  Failed: {}  Skipped: {}",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );

    for (i, outcome) in report.outcomes.iter().enumerate() {
        let status = match &outcome.status {
            MergeStatus::Success => "ok".to_string(),
            MergeStatus::Failed { reason } => format!("failed: {}", reason),
            MergeStatus::Skipped => "skipped".to_string(),
        };
        println!(
            "  {}. {} + {} -> {} [{}]{}",
            i + 1,
            outcome.pair.video.path().display(),
            outcome.pair.audio.path().display(),
            outcome.output.display(),
            status,
            if outcome.deleted_sources {
                " (sources deleted)"
            } else {
                ""
            }
        );
    }

    if !report.unmatched.is_empty() {
        let (video, audio, unknown) = run::unmatched_by_kind(report);
        println!(
            "  Unmatched: {} video, {} audio, {} unknown",
            video, audio, unknown
        );
        for r in &report.unmatched {
            match r.error {
                Some(ref e) => println!("    {} ({})", r.path().display(), e),
                None => println!("    {} ({})", r.path().display(), r.kind),
            }
        }
    }

    let elapsed = report.finished_at - report.started_at;
    println!("  Elapsed: {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?;
    let prober = FfprobeProber::new(
        ffprobe.path.clone(),
        tool_timeout(&config),
        kill_grace(&config),
    );

    let media = scanner::describe_file(file)
        .with_context(|| format!("Failed to read file: {:?}", file))?;
    let result = prober
        .probe(Arc::new(media), &CancellationToken::new())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("File: {}", result.path().display());
        println!("Size: {} bytes", result.file.size);
        println!("Base name: {}", result.file.base_name);
        println!("Kind: {}", result.kind);
        match result.duration {
            Some(d) => println!("Duration: {:.3}s", d),
            None => println!("Duration: unknown"),
        }
        if let Some(res) = result.resolution {
            println!("Resolution: {}", res);
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable probing and merging.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Input dirs: {}", config.input_dirs.len());
    if let Some(out) = config.effective_output_dir() {
        println!("  Output dir: {}", out.display());
    }
    println!("  Extensions: {}", config.scan.extensions.join(", "));
    println!(
        "  Max duration diff: {}s",
        config.matching.max_duration_diff
    );
    println!(
        "  Workers: {} probe, {} merge",
        run::effective_workers(config.concurrency.probe_workers),
        run::effective_workers(config.concurrency.merge_workers)
    );
    println!(
        "  Retries: {}  Delete sources: {}",
        config.effective_retries(),
        config.merge.delete_sources
    );
    println!("  Template: {}", config.naming.template);
    for warning in config.warnings() {
        println!("  ⚠ {}", warning);
    }

    Ok(())
}
