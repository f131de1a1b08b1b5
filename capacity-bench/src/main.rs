// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! # Capacity Bench
//!
//! `capacity-bench` sweeps a range of sampling rates and, for each, searches
//! for the largest channel count the pipeline sustains in real time. Each
//! boundary is appended to the result log as soon as it is known.
//!
//! `capacity-bench run` starts the pipeline and simulator once with the
//! configuration as it stands and prints their output until `Ctrl-C`.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use capacity_bench::cancel::CancelToken;
use capacity_bench::harness::{SessionEnd, run_session};
use capacity_bench::search::StrategyKind;
use capacity_bench::settings::HarnessSettings;
use capacity_bench::types::ExternalCommand;
use capacity_bench::verdict::Profile;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use log::{LevelFilter, error, info};

/// Command-line arguments.
///
/// Everything except `debug` and `settings` overrides the layered settings
/// only when given.
#[derive(Parser)]
#[command(about = "Find the real-time channel capacity of a pipeline across sampling rates")]
struct Cli {
    /// Enable debug log messages
    #[arg(short, long)]
    debug: bool,

    /// TOML settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Pipeline executable
    #[arg(long)]
    pipeline: Option<PathBuf>,

    /// Simulator executable
    #[arg(long)]
    simulator: Option<PathBuf>,

    /// Configuration artifact shared with the pipeline and simulator
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Result log to append boundaries to
    #[arg(short, long)]
    results: Option<PathBuf>,

    /// Lowest sampling rate (Hz)
    #[arg(long)]
    rate_start: Option<u32>,

    /// Highest sampling rate (Hz), inclusive
    #[arg(long)]
    rate_stop: Option<u32>,

    /// Increment between sampling rates (Hz)
    #[arg(long)]
    rate_step: Option<u32>,

    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Window size and threshold pair
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Number of cycle latencies per trial
    #[arg(long)]
    window_size: Option<usize>,

    /// Mean cycle latency (us) a trial must stay below
    #[arg(long)]
    threshold_us: Option<u64>,

    /// Skip sampling rates already in the result log
    #[arg(long)]
    resume: bool,

    #[clap(subcommand)]
    command: Option<CommandArg>,
}

#[derive(Debug, Subcommand)]
enum CommandArg {
    /// Search every sampling rate for its real-time boundary (the default)
    Sweep,
    /// Start the pipeline and simulator with the configuration as it stands
    /// and print their output until Ctrl-C
    Run,
}

impl Cli {
    fn merge(&self, mut settings: HarnessSettings) -> HarnessSettings {
        if let Some(program) = &self.pipeline {
            settings.pipeline = ExternalCommand::new(program);
        }
        if let Some(program) = &self.simulator {
            settings.simulator = ExternalCommand::new(program);
        }
        if let Some(config) = &self.config {
            settings.config_path.clone_from(config);
        }
        if let Some(results) = &self.results {
            settings.results_path.clone_from(results);
        }
        if let Some(rate_start) = self.rate_start {
            settings.rate_start = rate_start;
        }
        if let Some(rate_stop) = self.rate_stop {
            settings.rate_stop = rate_stop;
        }
        if let Some(rate_step) = self.rate_step {
            settings.rate_step = rate_step;
        }
        if let Some(strategy) = self.strategy {
            settings.strategy = strategy;
        }
        if let Some(profile) = self.profile {
            settings.profile = profile;
        }
        if self.window_size.is_some() {
            settings.window_size = self.window_size;
        }
        if self.threshold_us.is_some() {
            settings.threshold_us = self.threshold_us;
        }
        if self.resume {
            settings.resume = true;
        }
        settings
    }
}

/// Configure the logger level and formating string.
fn setup_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::builder()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = Cli::parse();

    setup_logger(args.debug);

    let settings = args.merge(
        HarnessSettings::load(args.settings.as_deref()).wrap_err("Unable to load settings")?,
    );
    settings.validate()?;

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    ctrlc::set_handler(move || interrupt.cancel())
        .wrap_err("Unable to install the interrupt handler")?;

    match args.command {
        Some(CommandArg::Run) => run_pipeline(&settings, &cancel),
        Some(CommandArg::Sweep) | None => run_sweep(&settings, cancel),
    }
}

fn run_pipeline(settings: &HarnessSettings, cancel: &CancelToken) -> Result<ExitCode> {
    let end = run_session(
        &settings.config_path,
        settings.commands(),
        &settings.trial_timing().launch,
        cancel,
    )
    .wrap_err("Unable to run the pipeline")?;

    match end {
        SessionEnd::Interrupted => Ok(ExitCode::SUCCESS),
        SessionEnd::PipelineExited(Some(status)) if status.success() => Ok(ExitCode::SUCCESS),
        SessionEnd::PipelineExited(status) => {
            error!(
                "Pipeline exited: {}",
                status.map_or("unknown status".to_string(), |s| s.to_string())
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_sweep(settings: &HarnessSettings, cancel: CancelToken) -> Result<ExitCode> {
    let sweep = settings.sweep()?;
    let mut runner = settings.trial_runner(cancel)?;
    info!(
        "Sweeping {:?} Hz, {} profile ({} samples below {}us)",
        sweep.plan().rates(),
        settings.profile,
        settings.window_size(),
        settings.threshold_us()
    );

    match sweep.run(&mut runner) {
        Ok(_) => {
            info!(
                "Benchmark concluded. View the results in {}",
                settings.results_path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_interrupted() => {
            error!("Stopped by operator");
            Ok(ExitCode::from(130))
        }
        Err(e) => Err(e).wrap_err("Benchmark sweep failed"),
    }
}
