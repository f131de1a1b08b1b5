// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Accumulation of per-cycle latency samples for one trial.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::cancel::CancelToken;
use crate::telemetry::TelemetryEvent;
use crate::types::{BenchError, BenchResult};

/// Anything that yields telemetry events from a running pipeline.
pub trait TelemetrySource {
    /// Wait (boundedly) for output and return the events parsed from it.
    fn poll_events(&mut self) -> BenchResult<Vec<TelemetryEvent>>;

    /// Whether the source has stopped producing new output.
    fn has_exited(&mut self) -> bool;

    fn exit_status(&self) -> Option<ExitStatus> {
        None
    }
}

/// The cycle latencies collected for one trial, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialWindow {
    samples: Vec<u64>,
    target: usize,
}

impl TrialWindow {
    #[must_use]
    pub fn new(target: usize) -> Self {
        Self {
            samples: Vec::with_capacity(target),
            target,
        }
    }

    /// Build a complete window from existing samples.
    #[must_use]
    pub fn from_samples(samples: Vec<u64>) -> Self {
        let target = samples.len();
        Self { samples, target }
    }

    /// Append a sample. Samples beyond the target size are dropped.
    pub fn push(&mut self, us: u64) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples.push(us);
        true
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.target
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    #[must_use]
    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    /// Exact sum of all samples.
    #[must_use]
    pub fn sum(&self) -> u128 {
        self.samples.iter().map(|&us| u128::from(us)).sum()
    }

    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum() as f64 / self.samples.len() as f64)
        }
    }
}

/// Pacing and bound for one collection.
#[derive(Clone, Copy, Debug)]
pub struct CollectPolicy {
    /// Pause between attempts that yielded no new sample.
    pub sample_interval: Duration,

    /// Give up once this much time has passed without filling the window.
    pub timeout: Duration,
}

/// Collect `target_size` cycle latencies from `source`.
///
/// Fails with [BenchError::PipelineExited] if the source stops before the
/// window is full, [BenchError::TelemetryTimeout] if the policy timeout
/// passes first, or [BenchError::Interrupted] on operator stop.
pub fn collect<S: TelemetrySource + ?Sized>(
    source: &mut S,
    target_size: usize,
    policy: &CollectPolicy,
    cancel: &CancelToken,
) -> BenchResult<TrialWindow> {
    let start = Instant::now();
    let mut window = TrialWindow::new(target_size);
    info!("Recording {target_size} cycle latencies...");

    loop {
        if window.is_full() {
            return Ok(window);
        }
        cancel.check()?;

        // Sample the exit state before draining so that output written just
        // before exit is still consumed.
        let exited = source.has_exited();
        let events = source.poll_events()?;
        let mut new_sample = false;
        for event in &events {
            if let TelemetryEvent::CycleLatency(us) = event {
                new_sample |= window.push(*us);
            }
        }
        if new_sample {
            debug!("{}/{target_size} samples", window.len());
        }
        if window.is_full() {
            return Ok(window);
        }

        if exited && events.is_empty() {
            return Err(BenchError::PipelineExited {
                collected: window.len(),
                target: target_size,
                status: source.exit_status(),
            });
        }

        let waited = start.elapsed();
        if waited >= policy.timeout {
            return Err(BenchError::TelemetryTimeout {
                collected: window.len(),
                target: target_size,
                waited,
            });
        }
        if !new_sample {
            cancel.sleep(policy.sample_interval.min(policy.timeout - waited))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Replays a fixed script of poll results, then reports exit.
    struct Scripted {
        polls: VecDeque<Vec<TelemetryEvent>>,
        exit_when_empty: bool,
    }

    impl Scripted {
        fn new(polls: Vec<Vec<TelemetryEvent>>, exit_when_empty: bool) -> Self {
            Self {
                polls: polls.into(),
                exit_when_empty,
            }
        }
    }

    impl TelemetrySource for Scripted {
        fn poll_events(&mut self) -> BenchResult<Vec<TelemetryEvent>> {
            Ok(self.polls.pop_front().unwrap_or_default())
        }

        fn has_exited(&mut self) -> bool {
            self.exit_when_empty && self.polls.is_empty()
        }
    }

    fn fast_policy() -> CollectPolicy {
        CollectPolicy {
            sample_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn only_latencies_are_collected() {
        let mut source = Scripted::new(
            vec![
                vec![TelemetryEvent::Unrecognized, TelemetryEvent::CycleLatency(5)],
                vec![],
                vec![TelemetryEvent::SpikeCount(100)],
                vec![
                    TelemetryEvent::CycleLatency(7),
                    TelemetryEvent::CycleLatency(9),
                    TelemetryEvent::CycleLatency(11),
                ],
            ],
            false,
        );
        let window = collect(&mut source, 3, &fast_policy(), &CancelToken::new()).unwrap();
        assert_eq!(window.samples(), &[5, 7, 9]);
        assert!(window.is_full());
    }

    #[test]
    fn early_exit_is_reported() {
        let mut source = Scripted::new(vec![vec![TelemetryEvent::CycleLatency(5)]], true);
        let err = collect(&mut source, 4, &fast_policy(), &CancelToken::new()).unwrap_err();
        match err {
            BenchError::PipelineExited {
                collected, target, ..
            } => {
                assert_eq!(collected, 1);
                assert_eq!(target, 4);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn silence_times_out() {
        let mut source = Scripted::new(vec![], false);
        let policy = CollectPolicy {
            sample_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(30),
        };
        let err = collect(&mut source, 2, &policy, &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            BenchError::TelemetryTimeout {
                collected: 0,
                target: 2,
                ..
            }
        ));
    }

    #[test]
    fn cancel_stops_collection() {
        let mut source = Scripted::new(vec![], false);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = collect(&mut source, 2, &fast_policy(), &cancel).unwrap_err();
        assert!(matches!(err, BenchError::Interrupted));
    }

    #[test]
    fn window_statistics() {
        let window = TrialWindow::from_samples(vec![1, 2, 4]);
        assert_eq!(window.sum(), 7);
        assert!((window.mean().unwrap() - 7.0 / 3.0).abs() < 1e-9);
        assert!(TrialWindow::new(3).mean().is_none());
    }
}
