// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! # Capacity Bench
//!
//! Finds, for each of a range of sampling rates, the largest number of input
//! channels that an external signal-processing pipeline can process while
//! keeping up with real time.
//!
//! Each measurement (a trial) runs the pipeline together with a data
//! simulator, records the per-cycle latency the pipeline reports on its
//! standard output and compares the mean against a threshold of roughly one
//! second. A [search strategy](search::SearchStrategy) chooses which channel
//! counts to try, and a [sweep](sweep::Sweep) carries each boundary forward
//! to the next sampling rate while appending it to a durable result log.
//!
//! The pipeline reports progress with lines of the form:
//!
//! ```text
//! Cycle 12 computed in: 873512us
//! Spikes Processed: 441
//! ```

pub mod cancel;
pub mod collector;
pub mod harness;
pub mod multiplexer;
pub mod process;
pub mod results;
pub mod search;
pub mod settings;
pub mod sweep;
pub mod telemetry;
pub mod trial_config;
pub mod types;
pub mod verdict;
