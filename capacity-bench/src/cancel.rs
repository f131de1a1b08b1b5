// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Operator-requested stop.
//!
//! A [CancelToken] is shared between the interrupt handler and every wait
//! loop in the harness. Waits are sliced so that a stop request is observed
//! within [CANCEL_SLICE] regardless of which phase is running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::types::{BenchError, BenchResult};

/// Longest uninterrupted sleep taken by [CancelToken::sleep]
pub const CANCEL_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return [BenchError::Interrupted] once a stop has been requested.
    pub fn check(&self) -> BenchResult<()> {
        if self.is_cancelled() {
            return Err(BenchError::Interrupted);
        }
        Ok(())
    }

    /// Sleep for `duration` unless a stop is requested first.
    pub fn sleep(&self, duration: Duration) -> BenchResult<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(CANCEL_SLICE.min(deadline - now));
        }
    }
}
