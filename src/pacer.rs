//! Wall-clock frame pacing.
//!
//! The pacer is a drop valve, not a queue: a frame that arrives sooner than `min_interval`
//! after the last accepted one is rejected and must be released by the caller straight away.

use std::time::{Duration, Instant};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(300);

/// Pacing state that persists across frames. Only `FramePacer` mutates it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacingState {
    last_accepted: Option<Instant>,
}

impl PacingState {
    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FramePacer {
    min_interval: Duration,
}

impl FramePacer {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide whether a frame arriving at `now` is processed. Records `now` on acceptance.
    ///
    /// The first frame is always accepted. A `now` earlier than the last acceptance counts as
    /// zero elapsed time, so the recorded timestamp never moves backwards.
    pub fn should_process(&self, now: Instant, state: &mut PacingState) -> bool {
        let accept = match state.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if accept {
            state.last_accepted = Some(now);
        }
        accept
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
