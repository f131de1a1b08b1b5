// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Strategies for finding the largest sustainable channel count at one
//! sampling rate.
//!
//! Both strategies assume capacity is monotonic in the channel count: if `n`
//! channels sustain real time then so does every count below `n`. This is
//! not verified.
//!
//! A strategy never runs processes itself; every measurement goes through a
//! [TrialRunner], which makes the strategies easy to drive against a
//! synthetic capacity function.

use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};

use crate::results::ResultRecord;
use crate::types::{BenchResult, TrialPoint};
use crate::verdict::Verdict;

/// Runs one trial and classifies it.
pub trait TrialRunner {
    fn run_trial(&mut self, point: TrialPoint) -> BenchResult<Verdict>;
}

impl<F> TrialRunner for F
where
    F: FnMut(TrialPoint) -> BenchResult<Verdict>,
{
    fn run_trial(&mut self, point: TrialPoint) -> BenchResult<Verdict> {
        self(point)
    }
}

/// What a strategy knows when it starts on a sampling rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchContext {
    pub sampling_rate: u32,

    /// Position of this rate within the sweep, starting from 0.
    pub rate_index: usize,

    /// Boundary found for the previous sampling rate, if any.
    pub seed: Option<ResultRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOutcome {
    pub sampling_rate: u32,
    pub best_channel_count: u32,

    /// Upper bound (bisection) or first probe (incremental) used.
    pub initial_bound: u32,

    /// Every trial run, in order.
    pub trials: Vec<(TrialPoint, Verdict)>,
}

impl SearchOutcome {
    #[must_use]
    pub fn record(&self) -> ResultRecord {
        ResultRecord::new(self.sampling_rate, self.best_channel_count)
    }
}

pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    /// Where the search for `ctx` will start.
    fn initial_bound(&self, ctx: &SearchContext) -> u32;

    fn search(
        &self,
        ctx: &SearchContext,
        runner: &mut dyn TrialRunner,
    ) -> BenchResult<SearchOutcome>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Bisection,
    Incremental,
}

/// Run one trial, recording it in `trials`. Errors are tagged with the point.
fn probe(
    runner: &mut dyn TrialRunner,
    point: TrialPoint,
    trials: &mut Vec<(TrialPoint, Verdict)>,
) -> BenchResult<bool> {
    info!("Testing {point}");
    let verdict = runner.run_trial(point).map_err(|e| e.during(point))?;
    info!("{point}: {verdict}");
    trials.push((point, verdict));
    Ok(verdict.is_sustained())
}

/// Largest sustained count in `[low, high]`, or `None` if none is.
fn bisect(
    runner: &mut dyn TrialRunner,
    sampling_rate: u32,
    mut low: u32,
    mut high: u32,
    trials: &mut Vec<(TrialPoint, Verdict)>,
) -> BenchResult<Option<u32>> {
    let mut best = None;
    while low <= high {
        let mid = low + (high - low) / 2;
        if probe(runner, TrialPoint::new(sampling_rate, mid), trials)? {
            best = Some(mid);
            low = mid + 1;
        } else if mid == 0 {
            break;
        } else {
            high = mid - 1;
        }
    }
    Ok(best)
}

/// Binary search over `[low, high]`, where `high` is the previous rate's
/// boundary (or `initial_high` for the first rate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bisection {
    pub low: u32,
    pub initial_high: u32,
}

impl Default for Bisection {
    fn default() -> Self {
        Self {
            low: 1,
            initial_high: 1500,
        }
    }
}

impl SearchStrategy for Bisection {
    fn name(&self) -> &'static str {
        "bisection"
    }

    fn initial_bound(&self, ctx: &SearchContext) -> u32 {
        match ctx.seed {
            Some(seed) => seed.best_channel_count,
            None => self.initial_high,
        }
    }

    fn search(
        &self,
        ctx: &SearchContext,
        runner: &mut dyn TrialRunner,
    ) -> BenchResult<SearchOutcome> {
        let initial_bound = self.initial_bound(ctx);
        let mut trials = Vec::new();
        let best_channel_count = bisect(
            runner,
            ctx.sampling_rate,
            self.low.max(1),
            initial_bound,
            &mut trials,
        )?
        .unwrap_or(0);

        Ok(SearchOutcome {
            sampling_rate: ctx.sampling_rate,
            best_channel_count,
            initial_bound,
            trials,
        })
    }
}

/// Step upwards from an initial guess until the first failure.
///
/// The first guess is `base / (rate_index + 1)`, or the previous boundary
/// scaled by the ratio of sampling rates when one is known. A previous
/// boundary of 0 concludes the rate at 0 without running anything.
///
/// If the very first probe fails the search steps downwards instead, down
/// to a single channel, and then bisects the last step so the boundary is
/// exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncrementalProbe {
    pub base: u32,
    pub step: u32,

    /// Never probe beyond this many channels.
    pub max_channels: u32,
}

impl Default for IncrementalProbe {
    fn default() -> Self {
        Self {
            base: 1000,
            step: 10,
            max_channels: 1 << 16,
        }
    }
}

impl SearchStrategy for IncrementalProbe {
    fn name(&self) -> &'static str {
        "incremental"
    }

    fn initial_bound(&self, ctx: &SearchContext) -> u32 {
        let guess = match ctx.seed {
            Some(seed) if seed.best_channel_count == 0 => return 0,
            Some(seed) if ctx.sampling_rate > 0 => {
                let scaled = u64::from(seed.best_channel_count) * u64::from(seed.sampling_rate)
                    / u64::from(ctx.sampling_rate);
                u32::try_from(scaled).unwrap_or(u32::MAX)
            }
            _ => {
                let divisor = u32::try_from(ctx.rate_index + 1).unwrap_or(u32::MAX);
                self.base / divisor
            }
        };
        guess.clamp(1, self.max_channels.max(1))
    }

    fn search(
        &self,
        ctx: &SearchContext,
        runner: &mut dyn TrialRunner,
    ) -> BenchResult<SearchOutcome> {
        let initial_bound = self.initial_bound(ctx);
        let step = self.step.max(1);
        let mut trials = Vec::new();
        let mut best_channel_count = 0;
        if initial_bound == 0 {
            return Ok(SearchOutcome {
                sampling_rate: ctx.sampling_rate,
                best_channel_count,
                initial_bound,
                trials,
            });
        }

        let mut n = initial_bound;
        if probe(runner, TrialPoint::new(ctx.sampling_rate, n), &mut trials)? {
            best_channel_count = n;
            loop {
                let Some(next) = n.checked_add(step).filter(|&c| c <= self.max_channels) else {
                    break;
                };
                n = next;
                if !probe(runner, TrialPoint::new(ctx.sampling_rate, n), &mut trials)? {
                    break;
                }
                best_channel_count = n;
            }
        } else {
            while n > 1 {
                let failed = n;
                n = n.saturating_sub(step).max(1);
                if probe(runner, TrialPoint::new(ctx.sampling_rate, n), &mut trials)? {
                    best_channel_count =
                        bisect(runner, ctx.sampling_rate, n + 1, failed - 1, &mut trials)?
                            .unwrap_or(n);
                    break;
                }
            }
        }

        Ok(SearchOutcome {
            sampling_rate: ctx.sampling_rate,
            best_channel_count,
            initial_bound,
            trials,
        })
    }
}
