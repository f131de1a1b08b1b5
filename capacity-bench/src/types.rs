// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::error::Error;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One benchmark run: a sampling rate in Hz and a number of input channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrialPoint {
    pub sampling_rate: u32,
    pub channel_count: u32,
}

impl TrialPoint {
    #[must_use]
    pub fn new(sampling_rate: u32, channel_count: u32) -> Self {
        Self {
            sampling_rate,
            channel_count,
        }
    }
}

impl fmt::Display for TrialPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} channels at {} Hz",
            self.channel_count, self.sampling_rate
        )
    }
}

/// An external executable together with any arguments that precede the
/// configuration path.
///
/// The pipeline and simulator are both invoked as `<program> [args..]
/// <config-path>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| (*a).to_string()).collect();
        self
    }

    /// Full argument list for a launch against `config_path`.
    #[must_use]
    pub fn argv(&self, config_path: &Path) -> Vec<OsString> {
        let mut argv: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        argv.push(config_path.as_os_str().to_owned());
        argv
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// Benchmark errors

#[macro_export]
/// Build a [BenchError::Settings] from a message that supports `to_string`
macro_rules! settings_error {
    ($msg:expr) => {
        Err($crate::types::BenchError::Settings {
            reason: $msg.to_string(),
        })
    };
}

/// Everything that can go wrong while running a sweep
#[derive(Debug)]
pub enum BenchError {
    /// The configuration artifact is missing, malformed or not writable.
    ConfigIo { path: PathBuf, reason: String },

    /// A subprocess binary is missing or failed to start.
    ProcessLaunch { program: String, reason: String },

    /// Bytes read from a subprocess were not valid text. Only ever logged.
    StreamDecode { stream: String, reason: String },

    /// The sample window was not filled within the collection deadline.
    TelemetryTimeout {
        collected: usize,
        target: usize,
        waited: Duration,
    },

    /// The pipeline exited before the sample window was filled.
    PipelineExited {
        collected: usize,
        target: usize,
        status: Option<ExitStatus>,
    },

    /// The operator requested a stop.
    Interrupted,

    /// Polling or reading subprocess output failed.
    StreamIo { reason: String },

    /// The result log could not be read or appended to.
    ResultsIo { path: PathBuf, reason: String },

    /// The harness settings are invalid.
    Settings { reason: String },

    /// An error raised while running a particular trial.
    Trial {
        point: TrialPoint,
        source: Box<BenchError>,
    },
}

impl BenchError {
    /// Attach the trial point that was being measured when `self` occurred.
    #[must_use]
    pub fn during(self, point: TrialPoint) -> Self {
        match self {
            BenchError::Trial { .. } => self,
            other => BenchError::Trial {
                point,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any trial context removed.
    #[must_use]
    pub fn root(&self) -> &BenchError {
        match self {
            BenchError::Trial { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self.root(), BenchError::Interrupted)
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BenchError::ConfigIo { path, reason } => {
                write!(f, "configuration {}: {reason}", path.display())
            }
            BenchError::ProcessLaunch { program, reason } => {
                write!(f, "failed to launch '{program}': {reason}")
            }
            BenchError::StreamDecode { stream, reason } => {
                write!(f, "undecodable output on {stream}: {reason}")
            }
            BenchError::TelemetryTimeout {
                collected,
                target,
                waited,
            } => write!(
                f,
                "only {collected}/{target} cycle latencies after {}ms",
                waited.as_millis()
            ),
            BenchError::PipelineExited {
                collected,
                target,
                status,
            } => match status {
                Some(status) => write!(
                    f,
                    "pipeline exited ({status}) after {collected}/{target} cycle latencies"
                ),
                None => write!(
                    f,
                    "pipeline exited after {collected}/{target} cycle latencies"
                ),
            },
            BenchError::Interrupted => write!(f, "interrupted"),
            BenchError::StreamIo { reason } => write!(f, "subprocess output: {reason}"),
            BenchError::ResultsIo { path, reason } => {
                write!(f, "result log {}: {reason}", path.display())
            }
            BenchError::Settings { reason } => write!(f, "invalid settings: {reason}"),
            BenchError::Trial { point, source } => write!(f, "{point}: {source}"),
        }
    }
}

impl Error for BenchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BenchError::Trial { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// The return type for most harness functions
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_context_wraps_once() {
        let point = TrialPoint::new(20_000, 64);
        let err = BenchError::Interrupted.during(point).during(point);
        assert!(err.is_interrupted());
        assert_eq!(err.to_string(), "64 channels at 20000 Hz: interrupted");
        assert!(err.source().is_some());
    }

    #[test]
    fn argv_appends_config_path() {
        let command = ExternalCommand::new("/bin/sh").with_args(&["stub.sh"]);
        let argv = command.argv(Path::new("config/benchmark.yaml"));
        assert_eq!(
            argv,
            vec![
                OsString::from("stub.sh"),
                OsString::from("config/benchmark.yaml")
            ]
        );
        assert_eq!(command.to_string(), "/bin/sh stub.sh");
    }
}
