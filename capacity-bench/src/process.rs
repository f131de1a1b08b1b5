// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Lifecycle of the pipeline and simulator subprocesses for one trial.
//!
//! A [TrialHandle] exclusively owns both processes and their output streams.
//! Teardown is unconditional. The processes are killed and reaped and their
//! streams closed when [end_trial] is called, and again (as a no-op) when the
//! handle is dropped, so no process or descriptor survives into the next
//! trial whichever step failed.

use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use filedescriptor::FileDescriptor;
use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::collector::TelemetrySource;
use crate::multiplexer::{LogMultiplexer, OutputLine, StreamId, StreamKind};
use crate::telemetry::{TelemetryEvent, TelemetryParser};
use crate::types::{BenchError, BenchResult, ExternalCommand};

pub const PIPELINE: &str = "pipeline";
pub const SIMULATOR: &str = "simulator";

/// The commands used to start one trial.
#[derive(Clone, Debug)]
pub struct TrialCommands {
    pub pipeline: ExternalCommand,

    /// `None` when the data stream comes from hardware.
    pub simulator: Option<ExternalCommand>,
}

/// Pacing used while starting a trial.
#[derive(Clone, Copy, Debug)]
pub struct LaunchTiming {
    /// Delay between starting the pipeline and starting the simulator.
    pub startup_delay: Duration,

    /// Upper bound on each wait for subprocess output.
    pub poll_timeout: Duration,

    /// Pause between output polls while waiting.
    pub drain_interval: Duration,
}

/// One child process whose output is owned by a [LogMultiplexer].
pub struct ManagedProcess {
    name: String,
    pid: u32,
    child: Option<Child>,
    status: Option<ExitStatus>,
}

impl ManagedProcess {
    /// Launch `command` against `config_path` with both output streams
    /// handed to `logs`.
    pub fn spawn(
        name: &str,
        command: &ExternalCommand,
        config_path: &Path,
        logs: &mut LogMultiplexer,
    ) -> BenchResult<(Self, StreamId)> {
        debug!("Starting {name}: {command} {}", config_path.display());
        let mut child = Command::new(&command.program)
            .args(command.argv(config_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BenchError::ProcessLaunch {
                program: command.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let process = Self {
            name: name.to_string(),
            pid: child.id(),
            child: Some(child),
            status: None,
        };

        // From here an early return drops `process`, which kills it.
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(BenchError::ProcessLaunch {
                program: command.to_string(),
                reason: "output streams were not captured".to_string(),
            });
        };
        let stdout_id = logs.add_stream(name, StreamKind::Stdout, FileDescriptor::new(stdout))?;
        logs.add_stream(name, StreamKind::Stderr, FileDescriptor::new(stderr))?;

        info!("Started {name} (pid {})", process.pid);
        Ok((process, stdout_id))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the process has been killed and reaped.
    #[must_use]
    pub fn is_reaped(&self) -> bool {
        self.child.is_none()
    }

    /// Last observed exit status.
    #[must_use]
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Exit status if the process has already finished, without blocking.
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.status.is_some() {
            return self.status;
        }
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    warn!("{} (pid {}) exited: {status}", self.name, self.pid);
                    self.status = Some(status);
                }
                Ok(None) => {}
                Err(e) => warn!("Unable to query {} (pid {}): {e}", self.name, self.pid),
            }
        }
        self.status
    }

    /// Kill the process and block until it has been reaped.
    ///
    /// Safe to call any number of times. A process that has already exited
    /// is reaped without being signalled.
    pub fn terminate(&mut self) -> Option<ExitStatus> {
        let Some(mut child) = self.child.take() else {
            return self.status;
        };

        if self.status.is_none() {
            match child.try_wait() {
                Ok(Some(status)) => self.status = Some(status),
                Ok(None) | Err(_) => {
                    if let Err(e) = child.kill() {
                        warn!("Failed to kill {} (pid {}): {e}", self.name, self.pid);
                    }
                    match child.wait() {
                        Ok(status) => self.status = Some(status),
                        Err(e) => warn!("Failed to reap {} (pid {}): {e}", self.name, self.pid),
                    }
                }
            }
        }
        debug!("{} (pid {}) reaped", self.name, self.pid);
        self.status
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn log_output(line: &OutputLine) {
    match line.label.kind {
        StreamKind::Stdout => info!("{}: {}", line.label, line.text),
        StreamKind::Stderr => warn!("{}: {}", line.label, line.text),
    }
}

/// The running processes of one trial.
pub struct TrialHandle {
    pipeline: ManagedProcess,
    simulator: Option<ManagedProcess>,
    logs: LogMultiplexer,
    pipeline_stdout: StreamId,
    parser: TelemetryParser,
    poll_timeout: Duration,
    ended: bool,
}

impl TrialHandle {
    #[must_use]
    pub fn pipeline(&self) -> &ManagedProcess {
        &self.pipeline
    }

    #[must_use]
    pub fn simulator(&self) -> Option<&ManagedProcess> {
        self.simulator.as_ref()
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.logs.open_streams()
    }

    /// Poll once and log everything that was read.
    fn poll_lines(&mut self) -> BenchResult<Vec<OutputLine>> {
        let lines = self.logs.poll(self.poll_timeout)?;
        for line in &lines {
            log_output(line);
        }
        Ok(lines)
    }

    /// Print any output that is currently available without blocking beyond
    /// the poll timeout. Returns the number of lines printed.
    pub fn print_available(&mut self) -> BenchResult<usize> {
        Ok(self.poll_lines()?.len())
    }

    /// Kill both processes, reap them and close their streams.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.pipeline.terminate();
        if let Some(simulator) = self.simulator.as_mut() {
            simulator.terminate();
        }
        for line in self.logs.close_all() {
            log_output(&line);
        }
        self.ended = true;
        info!("Processes killed");
    }
}

impl TelemetrySource for TrialHandle {
    fn poll_events(&mut self) -> BenchResult<Vec<TelemetryEvent>> {
        let lines = self.poll_lines()?;
        let mut events = Vec::new();
        for line in lines {
            if line.stream != self.pipeline_stdout {
                continue;
            }
            for event in self.parser.parse_line(&line.text) {
                match &event {
                    TelemetryEvent::CycleLatency(us) => debug!("Extracted microseconds: {us}"),
                    TelemetryEvent::SpikeCount(count) => info!("Spikes Processed: {count}"),
                    TelemetryEvent::Unrecognized => {}
                }
                events.push(event);
            }
        }
        Ok(events)
    }

    fn has_exited(&mut self) -> bool {
        // stdout may close before the process itself has exited
        self.ended
            || self.pipeline.poll_exit().is_some()
            || !self.logs.is_open(self.pipeline_stdout)
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        self.pipeline.status()
    }
}

impl Drop for TrialHandle {
    fn drop(&mut self) {
        self.end();
    }
}

/// Start the pipeline, wait for it to settle and then start the simulator.
pub fn start_trial(
    commands: &TrialCommands,
    config_path: &Path,
    timing: &LaunchTiming,
    cancel: &CancelToken,
) -> BenchResult<TrialHandle> {
    let mut logs = LogMultiplexer::new();
    let (pipeline, pipeline_stdout) =
        ManagedProcess::spawn(PIPELINE, &commands.pipeline, config_path, &mut logs)?;

    let mut handle = TrialHandle {
        pipeline,
        simulator: None,
        logs,
        pipeline_stdout,
        parser: TelemetryParser::new(),
        poll_timeout: timing.poll_timeout,
        ended: false,
    };

    info!("Waiting for the {PIPELINE} to start...");
    drain_startup_logs(
        &mut handle,
        timing.startup_delay,
        timing.drain_interval,
        cancel,
    )?;

    match &commands.simulator {
        Some(command) => {
            let (simulator, _) =
                ManagedProcess::spawn(SIMULATOR, command, config_path, &mut handle.logs)?;
            handle.simulator = Some(simulator);
        }
        None => info!("Using hardware, not starting the {SIMULATOR}"),
    }
    Ok(handle)
}

/// Print output from the running processes for `duration`.
///
/// Diagnostic only: nothing read here counts towards a measurement.
pub fn drain_startup_logs(
    handle: &mut TrialHandle,
    duration: Duration,
    interval: Duration,
    cancel: &CancelToken,
) -> BenchResult<()> {
    let deadline = Instant::now() + duration;
    loop {
        cancel.check()?;
        handle.print_available()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        cancel.sleep(interval.min(deadline - now))?;
    }
}

/// Unconditionally tear down a trial. Repeated calls are no-ops.
pub fn end_trial(handle: &mut TrialHandle) {
    handle.end();
}
