// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Append-only log of concluded sampling-rate searches.
//!
//! One line is written per sampling rate as soon as its boundary is known:
//!   `<best_channel_count> channels at <sampling_rate> Hz`

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};

use crate::types::{BenchError, BenchResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    pub sampling_rate: u32,
    pub best_channel_count: u32,
}

impl ResultRecord {
    #[must_use]
    pub fn new(sampling_rate: u32, best_channel_count: u32) -> Self {
        Self {
            sampling_rate,
            best_channel_count,
        }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} channels at {} Hz",
            self.best_channel_count, self.sampling_rate
        )
    }
}

impl FromStr for ResultRecord {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (channels, rate) = line
            .strip_suffix(" Hz")
            .and_then(|rest| rest.split_once(" channels at "))
            .ok_or_else(|| format!("'{line}' is not a result record"))?;
        let best_channel_count = channels
            .parse()
            .map_err(|e| format!("bad channel count in '{line}': {e}"))?;
        let sampling_rate = rate
            .parse()
            .map_err(|e| format!("bad sampling rate in '{line}': {e}"))?;
        Ok(Self {
            sampling_rate,
            best_channel_count,
        })
    }
}

pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: PathBuf::from(path),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: impl fmt::Display) -> BenchError {
        BenchError::ResultsIo {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }

    /// Durably append one record.
    pub fn append(&self, record: &ResultRecord) -> BenchResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{record}").map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        debug!("Appended '{record}' to {}", self.path.display());
        Ok(())
    }

    /// Read back every well-formed record. A missing log holds no records.
    pub fn load(&self) -> BenchResult<Vec<ResultRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut records = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            match line.parse() {
                Ok(record) => records.push(record),
                Err(e) => warn!("Ignoring line in {}: {e}", self.path.display()),
            }
        }
        Ok(records)
    }
}
