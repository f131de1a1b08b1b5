// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The configuration artifact shared with the pipeline and simulator.
//!
//! The harness only owns the two search fields. Every other field is kept
//! verbatim, in its original order, so that rewriting the file between
//! trials never changes settings that belong to the external binaries.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};

use crate::types::{BenchError, BenchResult, TrialPoint};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sampling_rate: u32,
    pub n_channel: u32,

    /// Externally-defined fields (`do_plot`, `use_hw`, `use_layout`,
    /// `mapping_path`, ...)
    #[serde(flatten)]
    other: Mapping,
}

fn config_error(path: &Path, reason: impl ToString) -> BenchError {
    BenchError::ConfigIo {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}

impl PipelineConfig {
    pub fn from_file(config_path: &Path) -> BenchResult<Self> {
        let s = fs::read_to_string(config_path)
            .map_err(|e| config_error(config_path, format!("unable to read: {e}")))?;
        Self::from_string(&s).map_err(|e| match e {
            BenchError::ConfigIo { reason, .. } => config_error(config_path, reason),
            other => other,
        })
    }

    pub fn from_string(config_str: &str) -> BenchResult<Self> {
        serde_yaml_ng::from_str(config_str)
            .map_err(|e| config_error(Path::new("<string>"), format!("malformed: {e}")))
    }

    /// A copy of this configuration describing `point`.
    #[must_use]
    pub fn with_trial(&self, point: TrialPoint) -> Self {
        let mut config = self.clone();
        config.sampling_rate = point.sampling_rate;
        config.n_channel = point.channel_count;
        config
    }

    #[must_use]
    pub fn trial_point(&self) -> TrialPoint {
        TrialPoint::new(self.sampling_rate, self.n_channel)
    }

    /// Whether the data stream comes from hardware rather than the simulator.
    #[must_use]
    pub fn use_hw(&self) -> bool {
        self.other
            .get("use_hw")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Look up one of the externally-defined fields.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.other.get(key)
    }

    pub fn to_yaml(&self) -> BenchResult<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| config_error(Path::new("<string>"), format!("unable to serialize: {e}")))
    }

    /// Write the full configuration to `config_path`.
    ///
    /// The content is written to a sibling file first and renamed into place
    /// so a reader never observes a partially written artifact.
    pub fn to_file(&self, config_path: &Path) -> BenchResult<()> {
        let contents = self.to_yaml().map_err(|e| match e {
            BenchError::ConfigIo { reason, .. } => config_error(config_path, reason),
            other => other,
        })?;

        let mut staging = config_path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, contents)
            .map_err(|e| config_error(config_path, format!("unable to write: {e}")))?;
        fs::rename(&staging, config_path)
            .map_err(|e| config_error(config_path, format!("unable to replace: {e}")))?;
        debug!("Wrote {} to {}", self.trial_point(), config_path.display());
        Ok(())
    }
}

/// Rewrite only the search fields of the artifact at `config_path`.
///
/// Must complete before the subprocesses for `point` are started.
pub fn write_trial(config_path: &Path, point: TrialPoint) -> BenchResult<PipelineConfig> {
    let config = PipelineConfig::from_file(config_path)?.with_trial(point);
    config.to_file(config_path)?;
    Ok(config)
}
