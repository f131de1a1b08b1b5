// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Layered harness settings.
//!
//! Sources are merged in increasing priority:
//!  - the built-in defaults
//!  - an optional TOML settings file
//!  - environment variables prefixed with [ENV_PREFIX]
//!
//! Command-line overrides are applied on top by the binary. Nested fields
//! are addressed from the environment with a double underscore, for example
//! `CAPACITY_BENCH_PIPELINE__PROGRAM`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::collector::CollectPolicy;
use crate::harness::{Measurement, ProcessTrialRunner, TrialTiming};
use crate::process::{LaunchTiming, TrialCommands};
use crate::results::ResultLog;
use crate::search::{Bisection, IncrementalProbe, SearchStrategy, StrategyKind};
use crate::settings_error;
use crate::sweep::{Sweep, SweepPlan};
use crate::types::{BenchError, BenchResult, ExternalCommand};
use crate::verdict::Profile;

pub const ENV_PREFIX: &str = "CAPACITY_BENCH_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    pub pipeline: ExternalCommand,
    pub simulator: ExternalCommand,

    /// The configuration artifact shared with both binaries.
    pub config_path: PathBuf,
    pub results_path: PathBuf,

    pub rate_start: u32,
    /// Inclusive.
    pub rate_stop: u32,
    pub rate_step: u32,

    pub strategy: StrategyKind,
    pub initial_high: u32,
    pub probe_base: u32,
    pub probe_step: u32,

    pub profile: Profile,
    pub window_size: Option<usize>,
    pub threshold_us: Option<u64>,

    pub startup_delay_ms: u64,
    pub stabilization_ms: u64,
    pub drain_interval_ms: u64,
    pub sample_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub collect_timeout_ms: u64,

    pub resume: bool,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            pipeline: ExternalCommand::new("./processing/cmake-build-debug/processing"),
            simulator: ExternalCommand::new("./sim/cmake-build-debug/sim"),
            config_path: PathBuf::from("config/benchmark.yaml"),
            results_path: PathBuf::from("benchmark_results.txt"),
            rate_start: 10_000,
            rate_stop: 100_000,
            rate_step: 10_000,
            strategy: StrategyKind::Bisection,
            initial_high: 1500,
            probe_base: 1000,
            probe_step: 10,
            profile: Profile::Standard,
            window_size: None,
            threshold_us: None,
            startup_delay_ms: 2000,
            stabilization_ms: 10_000,
            drain_interval_ms: 1000,
            sample_interval_ms: 500,
            poll_timeout_ms: 100,
            collect_timeout_ms: 120_000,
            resume: false,
        }
    }
}

fn invalid(e: impl ToString) -> BenchError {
    BenchError::Settings {
        reason: e.to_string(),
    }
}

impl HarnessSettings {
    /// Defaults, then `settings_file` (if given), then the environment.
    #[must_use]
    pub fn figment(settings_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(settings_file) = settings_file {
            figment = figment.merge(Toml::file(settings_file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate settings from `figment`.
    pub fn extract(figment: &Figment) -> BenchResult<Self> {
        let settings: Self = figment.extract().map_err(invalid)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(settings_file: Option<&Path>) -> BenchResult<Self> {
        if let Some(path) = settings_file.filter(|path| !path.is_file()) {
            return settings_error!(format!("{} not found", path.display()));
        }
        Self::extract(&Self::figment(settings_file))
    }

    pub fn validate(&self) -> BenchResult<()> {
        self.plan()?;
        if self.window_size() == 0 {
            return settings_error!("window size must be non-zero");
        }
        if self.threshold_us() == 0 {
            return settings_error!("threshold must be non-zero");
        }
        if self.poll_timeout_ms == 0 {
            return settings_error!("poll timeout must be non-zero");
        }
        if self.strategy == StrategyKind::Incremental && self.probe_step == 0 {
            return settings_error!("probe step must be non-zero");
        }
        if self.pipeline.program.as_os_str().is_empty() {
            return settings_error!("no pipeline program given");
        }
        Ok(())
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
            .unwrap_or_else(|| self.profile.window_size())
    }

    #[must_use]
    pub fn threshold_us(&self) -> u64 {
        self.threshold_us
            .unwrap_or_else(|| self.profile.threshold_us())
    }

    pub fn plan(&self) -> BenchResult<SweepPlan> {
        SweepPlan::new(self.rate_start, self.rate_stop, self.rate_step)
    }

    #[must_use]
    pub fn search_strategy(&self) -> Box<dyn SearchStrategy> {
        match self.strategy {
            StrategyKind::Bisection => Box::new(Bisection {
                low: 1,
                initial_high: self.initial_high,
            }),
            StrategyKind::Incremental => Box::new(IncrementalProbe {
                base: self.probe_base,
                step: self.probe_step,
                ..IncrementalProbe::default()
            }),
        }
    }

    #[must_use]
    pub fn commands(&self) -> TrialCommands {
        TrialCommands {
            pipeline: self.pipeline.clone(),
            simulator: Some(self.simulator.clone()),
        }
    }

    #[must_use]
    pub fn trial_timing(&self) -> TrialTiming {
        TrialTiming {
            launch: LaunchTiming {
                startup_delay: Duration::from_millis(self.startup_delay_ms),
                poll_timeout: Duration::from_millis(self.poll_timeout_ms),
                drain_interval: Duration::from_millis(self.drain_interval_ms),
            },
            stabilization: Duration::from_millis(self.stabilization_ms),
            collect: CollectPolicy {
                sample_interval: Duration::from_millis(self.sample_interval_ms),
                timeout: Duration::from_millis(self.collect_timeout_ms),
            },
        }
    }

    #[must_use]
    pub fn measurement(&self) -> Measurement {
        Measurement {
            window_size: self.window_size(),
            threshold_us: self.threshold_us(),
        }
    }

    pub fn sweep(&self) -> BenchResult<Sweep> {
        Ok(Sweep::new(
            self.plan()?,
            self.search_strategy(),
            ResultLog::new(&self.results_path),
        )
        .with_resume(self.resume))
    }

    pub fn trial_runner(&self, cancel: CancelToken) -> BenchResult<ProcessTrialRunner> {
        ProcessTrialRunner::new(
            &self.config_path,
            self.commands(),
            self.trial_timing(),
            self.measurement(),
            cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn from_toml(toml: &str) -> BenchResult<HarnessSettings> {
        let figment = Figment::new()
            .merge(Serialized::defaults(HarnessSettings::default()))
            .merge(Toml::string(toml));
        HarnessSettings::extract(&figment)
    }

    #[test]
    fn defaults_are_valid() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings, HarnessSettings::default());
        assert_eq!(settings.window_size(), 20);
        assert_eq!(settings.threshold_us(), 1_010_000);
        assert_eq!(settings.plan().unwrap().rates().len(), 10);
        assert_eq!(settings.search_strategy().name(), "bisection");
    }

    #[test]
    fn file_overrides_defaults() {
        let settings = from_toml(
            r#"
            strategy = "incremental"
            profile = "quick"
            rate_start = 20000
            rate_stop = 40000
            threshold_us = 990000

            [pipeline]
            program = "/bin/sh"
            args = ["pipeline.sh"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.search_strategy().name(), "incremental");
        assert_eq!(settings.window_size(), 10);
        assert_eq!(settings.threshold_us(), 990_000);
        assert_eq!(settings.plan().unwrap().rates(), &[20_000, 30_000, 40_000]);
        assert_eq!(settings.pipeline.to_string(), "/bin/sh pipeline.sh");
        assert_eq!(settings.simulator, HarnessSettings::default().simulator);
    }

    #[test]
    fn invalid_settings() {
        for toml in [
            "rate_step = 0",
            "rate_start = 50000\nrate_stop = 10000",
            "window_size = 0",
            "poll_timeout_ms = 0",
            "strategy = \"incremental\"\nprobe_step = 0",
            "strategy = \"random\"",
        ] {
            assert!(
                matches!(from_toml(toml), Err(BenchError::Settings { .. })),
                "{toml}"
            );
        }
    }

    #[test]
    fn load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        fs::write(&path, "initial_high = 64\nresume = true\n").unwrap();

        let settings = HarnessSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.initial_high, 64);
        assert!(settings.resume);

        let missing = HarnessSettings::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(missing, Err(BenchError::Settings { .. })));
    }

    #[test]
    fn timings() {
        let timing = from_toml("collect_timeout_ms = 250").unwrap().trial_timing();
        assert_eq!(timing.launch.startup_delay, Duration::from_secs(2));
        assert_eq!(timing.stabilization, Duration::from_secs(10));
        assert_eq!(timing.collect.sample_interval, Duration::from_millis(500));
        assert_eq!(timing.collect.timeout, Duration::from_millis(250));
    }
}
