// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use capacity_bench::results::ResultRecord;
use capacity_bench::search::{
    Bisection, IncrementalProbe, SearchContext, SearchStrategy, TrialRunner,
};
use capacity_bench::types::{BenchResult, TrialPoint};
use capacity_bench::verdict::Verdict;

/// Sustains real time up to a fixed channel count at every sampling rate.
struct Capacity {
    limit: u32,
    trials: Vec<TrialPoint>,
}

impl Capacity {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            trials: Vec::new(),
        }
    }
}

impl TrialRunner for Capacity {
    fn run_trial(&mut self, point: TrialPoint) -> BenchResult<Verdict> {
        self.trials.push(point);
        Ok(if point.channel_count <= self.limit {
            Verdict::Sustained
        } else {
            Verdict::NotSustained
        })
    }
}

fn first_rate(sampling_rate: u32) -> SearchContext {
    SearchContext {
        sampling_rate,
        rate_index: 0,
        seed: None,
    }
}

#[test]
fn bisection_converges_in_log_trials() {
    let strategy = Bisection {
        low: 1,
        initial_high: 100,
    };
    let mut capacity = Capacity::new(42);
    let outcome = strategy.search(&first_rate(10_000), &mut capacity).unwrap();

    assert_eq!(outcome.best_channel_count, 42);
    assert_eq!(outcome.initial_bound, 100);
    // ceil(log2(100))
    assert!(capacity.trials.len() <= 7, "{:?}", capacity.trials);
    assert_eq!(outcome.trials.len(), capacity.trials.len());
}

#[test]
fn bisection_through_every_limit() {
    let strategy = Bisection {
        low: 1,
        initial_high: 100,
    };
    for limit in 0..=100 {
        let mut capacity = Capacity::new(limit);
        let outcome = strategy.search(&first_rate(10_000), &mut capacity).unwrap();
        assert_eq!(outcome.best_channel_count, limit);
        assert!(capacity.trials.len() <= 7);
    }
}

#[test]
fn incremental_probe_stops_at_first_failure() {
    let strategy = IncrementalProbe {
        base: 10,
        step: 5,
        max_channels: 1000,
    };
    let mut capacity = Capacity::new(42);
    let outcome = strategy.search(&first_rate(30_000), &mut capacity).unwrap();

    assert_eq!(outcome.best_channel_count, 40);
    assert_eq!(outcome.record(), ResultRecord::new(30_000, 40));
    let counts: Vec<_> = capacity.trials.iter().map(|p| p.channel_count).collect();
    assert_eq!(counts, vec![10, 15, 20, 25, 30, 35, 40, 45]);
    assert!(capacity.trials.iter().all(|p| p.sampling_rate == 30_000));
}

#[test]
fn seeds_carry_between_rates() {
    let strategies: [Box<dyn SearchStrategy>; 2] = [
        Box::new(Bisection::default()),
        Box::new(IncrementalProbe::default()),
    ];
    for strategy in &strategies {
        let first = strategy
            .search(&first_rate(10_000), &mut Capacity::new(600))
            .unwrap();
        let second_ctx = SearchContext {
            sampling_rate: 20_000,
            rate_index: 1,
            seed: Some(first.record()),
        };
        let second = strategy
            .search(&second_ctx, &mut Capacity::new(300))
            .unwrap();

        assert_eq!(first.best_channel_count, 600, "{}", strategy.name());
        assert_eq!(second.best_channel_count, 300, "{}", strategy.name());
        assert_eq!(
            strategy.initial_bound(&second_ctx),
            second.initial_bound,
            "{}",
            strategy.name()
        );
    }
}
