// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Line-oriented telemetry emitted by the pipeline.
//!
//! Once per processing cycle the pipeline prints a line containing
//! `computed in: <N>us`, and optionally `Spikes Processed: <N>`. Everything
//! else is advisory text.

use std::fmt;

use log::debug;
use regex::Regex;

use crate::types::BenchError;

const CYCLE_LATENCY_PATTERN: &str = r"computed in: (?<us>\d+)us";
const SPIKE_COUNT_PATTERN: &str = r"Spikes Processed: (?<count>\d+)";

/// Upper bound on a buffered partial line. Longer runs without a terminator
/// are emitted as a line of their own.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// Duration of one compute cycle in microseconds.
    CycleLatency(u64),

    /// Number of spikes processed, reported for information only.
    SpikeCount(u64),

    /// Any other output.
    Unrecognized,
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TelemetryEvent::CycleLatency(us) => write!(f, "cycle latency {us}us"),
            TelemetryEvent::SpikeCount(count) => write!(f, "{count} spikes processed"),
            TelemetryEvent::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

pub struct TelemetryParser {
    cycle_latency_re: Regex,
    spike_count_re: Regex,
}

impl Default for TelemetryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cycle_latency_re: Regex::new(CYCLE_LATENCY_PATTERN)
                .expect("`CYCLE_LATENCY_PATTERN` should be a valid regex"),
            spike_count_re: Regex::new(SPIKE_COUNT_PATTERN)
                .expect("`SPIKE_COUNT_PATTERN` should be a valid regex"),
        }
    }

    /// Every event carried by a single line, cycle latency first.
    ///
    /// A line carrying neither marker, or only markers whose value does not
    /// fit, yields a single [TelemetryEvent::Unrecognized].
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Vec<TelemetryEvent> {
        let mut events = Vec::new();
        if let Some(c) = self.cycle_latency_re.captures(line) {
            match c["us"].parse() {
                Ok(us) => events.push(TelemetryEvent::CycleLatency(us)),
                Err(e) => debug!("Ignoring cycle latency in '{line}': {e}"),
            }
        }
        if let Some(c) = self.spike_count_re.captures(line) {
            match c["count"].parse() {
                Ok(count) => events.push(TelemetryEvent::SpikeCount(count)),
                Err(e) => debug!("Ignoring spike count in '{line}': {e}"),
            }
        }
        if events.is_empty() {
            events.push(TelemetryEvent::Unrecognized);
        }
        events
    }
}

/// Reassembles lines from arbitrarily split chunks of one stream.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, without the
    /// terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    lines.push(self.take_line());
                }
            }
        }
        lines
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take_line(&mut self) -> Vec<u8> {
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        line
    }
}

/// Decode one complete line of output from `stream`.
pub fn decode_line(stream: &str, bytes: Vec<u8>) -> Result<String, BenchError> {
    String::from_utf8(bytes).map_err(|e| BenchError::StreamDecode {
        stream: stream.to_string(),
        reason: e.utf8_error().to_string(),
    })
}
