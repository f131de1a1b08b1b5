// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The outer loop across sampling rates.
//!
//! Rates are visited in ascending order. The boundary concluded for one rate
//! is appended to the [ResultLog] before the next rate starts and becomes
//! the seed for the next search.

use std::fmt::Write;

use log::{error, info};

use crate::results::{ResultLog, ResultRecord};
use crate::search::{SearchContext, SearchOutcome, SearchStrategy, TrialRunner};
use crate::settings_error;
use crate::types::BenchResult;

/// The ascending list of sampling rates to sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepPlan {
    rates: Vec<u32>,
}

impl SweepPlan {
    /// Every rate from `start` to `stop` inclusive in increments of `step`.
    pub fn new(start: u32, stop: u32, step: u32) -> BenchResult<Self> {
        if step == 0 {
            return settings_error!("sampling rate step must be non-zero");
        }
        if start == 0 {
            return settings_error!("sampling rates must be positive");
        }
        if start > stop {
            return settings_error!(format!(
                "sampling rate start ({start}) is above stop ({stop})"
            ));
        }
        let rates = (start..=stop).step_by(step as usize).collect();
        Ok(Self { rates })
    }

    /// An explicit list of rates, which must be strictly ascending.
    pub fn from_rates(rates: Vec<u32>) -> BenchResult<Self> {
        if rates.is_empty() {
            return settings_error!("no sampling rates to sweep");
        }
        if rates.contains(&0) {
            return settings_error!("sampling rates must be positive");
        }
        if rates.windows(2).any(|w| w[0] >= w[1]) {
            return settings_error!(format!("sampling rates {rates:?} are not ascending"));
        }
        Ok(Self { rates })
    }

    #[must_use]
    pub fn rates(&self) -> &[u32] {
        &self.rates
    }
}

/// Everything concluded by a [Sweep::run].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records read back from the log when resuming.
    pub resumed: Vec<ResultRecord>,

    /// Searches run by this sweep, in rate order.
    pub outcomes: Vec<SearchOutcome>,
}

impl SweepReport {
    /// All records known after the sweep: resumed ones first.
    #[must_use]
    pub fn records(&self) -> Vec<ResultRecord> {
        self.resumed
            .iter()
            .copied()
            .chain(self.outcomes.iter().map(SearchOutcome::record))
            .collect()
    }
}

pub struct Sweep {
    plan: SweepPlan,
    strategy: Box<dyn SearchStrategy>,
    log: ResultLog,
    resume: bool,
}

impl Sweep {
    #[must_use]
    pub fn new(plan: SweepPlan, strategy: Box<dyn SearchStrategy>, log: ResultLog) -> Self {
        Self {
            plan,
            strategy,
            log,
            resume: false,
        }
    }

    /// Skip rates already concluded in the result log.
    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    #[must_use]
    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Search every rate in the plan, using `runner` for every trial.
    ///
    /// Stops at the first error, which has already been logged along with
    /// the sampling rate that was in progress. Records appended before the
    /// error remain in the log.
    pub fn run(&self, runner: &mut dyn TrialRunner) -> BenchResult<SweepReport> {
        let mut report = SweepReport::default();
        if self.resume {
            report.resumed = self.log.load()?;
            for record in &report.resumed {
                info!("Already concluded: {record}");
            }
        }
        let mut seed = report.resumed.last().copied();

        for (rate_index, &sampling_rate) in self.plan.rates.iter().enumerate() {
            if report
                .resumed
                .iter()
                .any(|r| r.sampling_rate == sampling_rate)
            {
                info!("Skipping {sampling_rate} Hz");
                continue;
            }

            let ctx = SearchContext {
                sampling_rate,
                rate_index,
                seed,
            };
            let outcome = self.search_rate(&ctx, runner).inspect_err(|e| {
                if e.is_interrupted() {
                    error!("Interrupted while testing {sampling_rate} Hz");
                } else {
                    error!("Sweep stopped while testing {sampling_rate} Hz: {e}");
                }
                error!(
                    "{} results recorded in {}",
                    report.resumed.len() + report.outcomes.len(),
                    self.log.path().display()
                );
            })?;
            seed = Some(outcome.record());
            report.outcomes.push(outcome);
        }

        for line in summary(&report.records()).lines() {
            info!("{line}");
        }
        Ok(report)
    }

    fn search_rate(
        &self,
        ctx: &SearchContext,
        runner: &mut dyn TrialRunner,
    ) -> BenchResult<SearchOutcome> {
        info!(
            "Sampling rate {} Hz: {} search from {} channels",
            ctx.sampling_rate,
            self.strategy.name(),
            self.strategy.initial_bound(ctx)
        );
        let outcome = self.strategy.search(ctx, runner)?;
        let record = outcome.record();
        self.log.append(&record)?;
        info!(
            "Concluded {record} after {} trials",
            outcome.trials.len()
        );
        Ok(outcome)
    }
}

/// A table of `records` for the operator.
#[must_use]
pub fn summary(records: &[ResultRecord]) -> String {
    let mut table = String::from("Sampling rate (Hz) | Channels\n");
    table.push_str("-------------------+---------\n");
    for record in records {
        // Writing to a String cannot fail
        let _ = writeln!(
            table,
            "{:>18} | {:>8}",
            record.sampling_rate, record.best_channel_count
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::search::Bisection;
    use crate::types::{BenchError, TrialPoint};
    use crate::verdict::Verdict;

    /// Sustained while `channels * rate` stays within a fixed budget.
    fn budget(point: TrialPoint) -> BenchResult<Verdict> {
        let load = u64::from(point.channel_count) * u64::from(point.sampling_rate);
        Ok(if load <= 4_000_000 {
            Verdict::Sustained
        } else {
            Verdict::NotSustained
        })
    }

    fn bisection() -> Box<dyn SearchStrategy> {
        Box::new(Bisection {
            low: 1,
            initial_high: 1500,
        })
    }

    #[test]
    fn plan_from_range() {
        let plan = SweepPlan::new(10_000, 100_000, 10_000).unwrap();
        assert_eq!(plan.rates().len(), 10);
        assert_eq!(plan.rates()[0], 10_000);
        assert_eq!(plan.rates()[9], 100_000);

        assert_eq!(SweepPlan::new(5, 12, 5).unwrap().rates(), &[5, 10]);
        assert!(SweepPlan::new(10, 5, 1).is_err());
        assert!(SweepPlan::new(10, 20, 0).is_err());
        assert!(SweepPlan::from_rates(vec![20, 10]).is_err());
    }

    #[test]
    fn boundaries_are_logged_and_seeded() {
        let dir = tempdir().unwrap();
        let log = ResultLog::new(&dir.path().join("results.txt"));
        let sweep = Sweep::new(
            SweepPlan::from_rates(vec![10_000, 20_000]).unwrap(),
            bisection(),
            log,
        );

        let report = sweep.run(&mut budget).unwrap();
        assert_eq!(
            report.records(),
            vec![ResultRecord::new(10_000, 400), ResultRecord::new(20_000, 200)]
        );
        assert_eq!(report.outcomes[1].initial_bound, 400);
        assert_eq!(
            fs::read_to_string(dir.path().join("results.txt")).unwrap(),
            "400 channels at 10000 Hz\n200 channels at 20000 Hz\n"
        );
    }

    #[test]
    fn resume_skips_concluded_rates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.txt");
        fs::write(&path, "400 channels at 10000 Hz\n").unwrap();

        let mut tested = Vec::new();
        let report = Sweep::new(
            SweepPlan::from_rates(vec![10_000, 20_000]).unwrap(),
            bisection(),
            ResultLog::new(&path),
        )
        .with_resume(true)
        .run(&mut |point: TrialPoint| -> BenchResult<Verdict> {
            tested.push(point);
            budget(point)
        })
        .unwrap();

        assert!(tested.iter().all(|p| p.sampling_rate == 20_000));
        assert_eq!(report.resumed, vec![ResultRecord::new(10_000, 400)]);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].initial_bound, 400);
        assert_eq!(report.outcomes[0].best_channel_count, 200);
    }

    #[test]
    fn interrupt_keeps_earlier_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.txt");
        let sweep = Sweep::new(
            SweepPlan::from_rates(vec![10_000, 20_000]).unwrap(),
            bisection(),
            ResultLog::new(&path),
        );

        let err = sweep
            .run(&mut |point: TrialPoint| -> BenchResult<Verdict> {
                if point.sampling_rate == 20_000 {
                    return Err(BenchError::Interrupted);
                }
                budget(point)
            })
            .unwrap_err();

        assert!(err.is_interrupted());
        match err {
            BenchError::Trial { point, .. } => assert_eq!(point.sampling_rate, 20_000),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "400 channels at 10000 Hz\n"
        );
    }

    #[test]
    fn summary_table() {
        let table = summary(&[ResultRecord::new(10_000, 39)]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].trim_start().starts_with("10000 |"));
        assert!(lines[2].ends_with("39"));
    }
}
