// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Execution of a single trial against the real pipeline and simulator.
//!
//! [ProcessTrialRunner] is the one trial-execution harness shared by every
//! search strategy. Each trial runs strictly in order:
//!  - write the trial point into the configuration artifact
//!  - start the pipeline, then the simulator
//!  - print output while the processes stabilise
//!  - collect the sample window
//!  - classify the window
//!  - tear both processes down
//!
//! Teardown happens whichever of these steps fails.
//!
//! [run_session] starts the same processes without a measurement and prints
//! their output until stopped.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use log::{info, warn};

use crate::cancel::CancelToken;
use crate::collector::{CollectPolicy, TelemetrySource, TrialWindow, collect};
use crate::process::{
    LaunchTiming, TrialCommands, TrialHandle, drain_startup_logs, end_trial, start_trial,
};
use crate::search::TrialRunner;
use crate::trial_config::{PipelineConfig, write_trial};
use crate::types::{BenchError, BenchResult, TrialPoint};
use crate::verdict::{Verdict, classify};

/// Timings applied to every trial.
#[derive(Clone, Copy, Debug)]
pub struct TrialTiming {
    pub launch: LaunchTiming,

    /// Time after the simulator starts during which output is printed but
    /// not measured.
    pub stabilization: Duration,

    pub collect: CollectPolicy,
}

/// How a trial is judged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub window_size: usize,
    pub threshold_us: u64,
}

pub struct ProcessTrialRunner {
    config_path: PathBuf,
    commands: TrialCommands,
    timing: TrialTiming,
    measurement: Measurement,
    cancel: CancelToken,
}

impl ProcessTrialRunner {
    /// Prepare to run trials against the configuration artifact at
    /// `config_path`.
    ///
    /// The artifact is read once here, and the simulator command dropped
    /// when it selects hardware input. Each trial then re-reads it, so edits
    /// made between trials to fields other than the trial point are kept.
    pub fn new(
        config_path: &Path,
        mut commands: TrialCommands,
        timing: TrialTiming,
        measurement: Measurement,
        cancel: CancelToken,
    ) -> BenchResult<Self> {
        let config = PipelineConfig::from_file(config_path)?;
        if config.use_hw() && commands.simulator.take().is_some() {
            info!("{} selects hardware input", config_path.display());
        }
        Ok(Self {
            config_path: PathBuf::from(config_path),
            commands,
            timing,
            measurement,
            cancel,
        })
    }

    #[must_use]
    pub fn commands(&self) -> &TrialCommands {
        &self.commands
    }

    fn measure(&self, handle: &mut TrialHandle) -> BenchResult<TrialWindow> {
        info!(
            "Waiting {}ms for the pipeline to stabilise...",
            self.timing.stabilization.as_millis()
        );
        drain_startup_logs(
            handle,
            self.timing.stabilization,
            self.timing.launch.drain_interval,
            &self.cancel,
        )?;
        collect(
            handle,
            self.measurement.window_size,
            &self.timing.collect,
            &self.cancel,
        )
    }
}

impl TrialRunner for ProcessTrialRunner {
    fn run_trial(&mut self, point: TrialPoint) -> BenchResult<Verdict> {
        self.cancel.check()?;
        write_trial(&self.config_path, point)?;

        // A failed start drops the partially started handle, killing
        // anything that was launched.
        let mut handle = start_trial(
            &self.commands,
            &self.config_path,
            &self.timing.launch,
            &self.cancel,
        )?;
        let measured = self.measure(&mut handle);
        end_trial(&mut handle);

        match measured {
            Ok(window) => Ok(classify(&window, self.measurement.threshold_us)),
            Err(e @ BenchError::TelemetryTimeout { .. }) => {
                warn!("{point}: inconclusive, {e}");
                Ok(Verdict::Inconclusive)
            }
            Err(e @ BenchError::PipelineExited { .. }) => {
                warn!("{point}: {e}");
                Ok(Verdict::PipelineExited)
            }
            Err(e) => Err(e),
        }
    }
}

/// How a [run_session] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stopped by the operator.
    Interrupted,

    /// The pipeline stopped on its own.
    PipelineExited(Option<ExitStatus>),
}

/// Start the pipeline (and the simulator unless the artifact selects
/// hardware input) against the configuration at `config_path` and print
/// their output until `cancel` fires or the pipeline exits.
///
/// Nothing is measured and the artifact is not modified.
pub fn run_session(
    config_path: &Path,
    mut commands: TrialCommands,
    timing: &LaunchTiming,
    cancel: &CancelToken,
) -> BenchResult<SessionEnd> {
    let config = PipelineConfig::from_file(config_path)?;
    info!("Configuration {}:", config_path.display());
    for line in config.to_yaml()?.lines() {
        info!("  {line}");
    }
    if config.use_hw() {
        commands.simulator = None;
    }

    let mut handle = match start_trial(&commands, config_path, timing, cancel) {
        Ok(handle) => handle,
        Err(BenchError::Interrupted) => return Ok(SessionEnd::Interrupted),
        Err(e) => return Err(e),
    };

    let outcome = loop {
        if cancel.is_cancelled() {
            break Ok(false);
        }
        let exited = handle.has_exited();
        if let Err(e) = handle.print_available() {
            break Err(e);
        }
        if exited {
            break Ok(true);
        }
    };
    end_trial(&mut handle);

    if outcome? {
        Ok(SessionEnd::PipelineExited(handle.exit_status()))
    } else {
        info!("Stopped by operator");
        Ok(SessionEnd::Interrupted)
    }
}
