// Copyright (c) The xJet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long a test or hook took to run.
//!
//! Tracks a start time and a duration using a combination of a wall clock (`DateTime<Local>`,
//! surfaced in `LOG` events' timestamps) and a monotonic clock (`Instant`, used for the
//! reported `duration`).

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// A running stopwatch, started when a test or hook begins executing.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls happen imperceptibly close to each other, which is good
            // enough for matching a wall-clock timestamp to a monotonic elapsed duration.
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            elapsed: self.instant.elapsed(),
        }
    }
}

/// A snapshot of the state of the stopwatch.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    /// The time at which the stopwatch was started.
    pub(crate) start_time: DateTime<Local>,

    /// The amount of time elapsed since the stopwatch was started.
    pub(crate) elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwatch_elapsed_advances() {
        let start = stopwatch();
        std::thread::sleep(Duration::from_millis(20));
        let snapshot = start.snapshot();
        assert!(snapshot.elapsed >= Duration::from_millis(20));
    }
}
