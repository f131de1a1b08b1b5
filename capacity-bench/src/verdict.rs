// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Classification of a trial as real-time sustaining or not.
//!
//! The pipeline processes data in one-second cycles, so it keeps up with
//! the input stream if the mean cycle latency stays below roughly one
//! second.

use std::fmt;

use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};

use crate::collector::TrialWindow;

/// Window size and threshold pairs used by the benchmark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 20 samples against 1,010,000us.
    #[default]
    Standard,

    /// 10 samples against 1,000,000us.
    Quick,
}

impl Profile {
    #[must_use]
    pub fn window_size(self) -> usize {
        match self {
            Profile::Standard => 20,
            Profile::Quick => 10,
        }
    }

    #[must_use]
    pub fn threshold_us(self) -> u64 {
        match self {
            Profile::Standard => 1_010_000,
            Profile::Quick => 1_000_000,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Profile::Standard => write!(f, "standard"),
            Profile::Quick => write!(f, "quick"),
        }
    }
}

/// Outcome of one trial
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Mean cycle latency below the threshold.
    Sustained,

    /// Mean cycle latency at or above the threshold.
    NotSustained,

    /// The window was not filled before the collection timeout.
    Inconclusive,

    /// The pipeline exited before the window was filled.
    PipelineExited,
}

impl Verdict {
    /// Only a clean measurement below the threshold counts as success.
    #[must_use]
    pub fn is_sustained(self) -> bool {
        self == Verdict::Sustained
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Sustained => write!(f, "sustained"),
            Verdict::NotSustained => write!(f, "not sustained"),
            Verdict::Inconclusive => write!(f, "inconclusive"),
            Verdict::PipelineExited => write!(f, "pipeline exited"),
        }
    }
}

/// `true` iff the mean of `window` is strictly below `threshold_us`.
///
/// The comparison is done on the exact sum so that a mean equal to the
/// threshold is never rounded below it. An empty window is never sustained.
#[must_use]
pub fn verdict(window: &TrialWindow, threshold_us: u64) -> bool {
    if window.is_empty() {
        return false;
    }
    window.sum() < u128::from(threshold_us) * window.len() as u128
}

/// Apply [verdict] and log the decision with the samples it was based on.
#[must_use]
pub fn classify(window: &TrialWindow, threshold_us: u64) -> Verdict {
    let mean = window.mean().unwrap_or(0.0);
    if verdict(window, threshold_us) {
        info!(
            "Realtime factor achieved (mean {mean:.0}us < {threshold_us}us): {:?}",
            window.samples()
        );
        Verdict::Sustained
    } else {
        info!(
            "Realtime factor not achieved (mean {mean:.0}us >= {threshold_us}us): {:?}",
            window.samples()
        );
        Verdict::NotSustained
    }
}
