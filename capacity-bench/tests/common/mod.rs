// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capacity_bench::collector::CollectPolicy;
use capacity_bench::harness::{Measurement, TrialTiming};
use capacity_bench::process::{LaunchTiming, TrialCommands};
use capacity_bench::types::ExternalCommand;
use tempfile::TempDir;

/// Reports a cycle latency of `n_channel * sampling_rate * 5 / 2` us every
/// 10ms, so a 1,000,000us threshold is crossed at `n * rate == 400,000`.
pub const LINEAR_PIPELINE: &str = r#"
config="$1"
n=$(sed -n 's/^n_channel: *//p' "$config")
rate=$(sed -n 's/^sampling_rate: *//p' "$config")
i=0
while true; do
    echo "cycle $i computed in: $((n * rate * 5 / 2))us"
    echo "Spikes Processed: $n"
    i=$((i + 1))
    sleep 0.01
done
"#;

/// Floods its output with slow cycles while warming up, then settles at
/// 1000us per cycle.
pub const WARMING_PIPELINE: &str = r#"
i=0
while [ $i -lt 1500 ]; do
    echo "warm-up $i computed in: 5000000us"
    i=$((i + 1))
done
while true; do
    echo "cycle computed in: 1000us"
    sleep 0.01
done
"#;

/// After 300ms writes ten fast cycles on lines longer than a read chunk,
/// then exits cleanly.
pub const BURST_PIPELINE: &str = r#"
sleep 0.3
pad=$(printf '%2000s' '')
i=0
while [ $i -lt 10 ]; do
    echo "cycle $i computed in: 5us$pad"
    i=$((i + 1))
done
"#;

/// Reports one cycle and then fails.
pub const CRASHING_PIPELINE: &str = r#"
echo "cycle 0 computed in: 5us"
echo "out of memory" >&2
exit 3
"#;

/// Starts but never reports a cycle.
pub const SILENT_PIPELINE: &str = "exec sleep 30\n";

/// Leaves a marker next to the configuration artifact and idles.
pub const MARKING_SIMULATOR: &str = r#"
touch "$(dirname "$1")/simulator.started"
exec sleep 30
"#;

pub const CONFIG: &str = "\
sampling_rate: 1000
n_channel: 1
do_plot: false
use_hw: false
use_layout: true
mapping_path: maps/probe.csv
";

/// Scratch directory holding a configuration artifact and stub scripts.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("benchmark.yaml"), CONFIG).unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path("benchmark.yaml")
    }

    pub fn write_config(&self, contents: &str) {
        fs::write(self.config_path(), contents).unwrap();
    }

    /// Write `body` as a script and return the command that runs it.
    pub fn script(&self, name: &str, body: &str) -> ExternalCommand {
        let path = self.path(name);
        fs::write(&path, body).unwrap();
        shell(&path)
    }

    pub fn simulator_started(&self) -> bool {
        self.path("simulator.started").exists()
    }
}

pub fn shell(script: &Path) -> ExternalCommand {
    ExternalCommand::new("/bin/sh").with_args(&[script.to_str().unwrap()])
}

pub fn commands(pipeline: ExternalCommand, simulator: ExternalCommand) -> TrialCommands {
    TrialCommands {
        pipeline,
        simulator: Some(simulator),
    }
}

pub fn fast_timing(collect_timeout: Duration) -> TrialTiming {
    TrialTiming {
        launch: LaunchTiming {
            startup_delay: Duration::from_millis(20),
            poll_timeout: Duration::from_millis(10),
            drain_interval: Duration::from_millis(10),
        },
        stabilization: Duration::from_millis(20),
        collect: CollectPolicy {
            sample_interval: Duration::from_millis(10),
            timeout: collect_timeout,
        },
    }
}

pub fn quick() -> Measurement {
    Measurement {
        window_size: 10,
        threshold_us: 1_000_000,
    }
}
