//! Virtual clock for the grading simulation.
//!
//! The [`SimClock`] advances only when the engine jumps to the next event
//! timestamp. Idle ticks are never visited, and the clock refuses to move
//! past its configured ceiling so a runaway schedule is cut off
//! deterministically.

use serde::{Deserialize, Serialize};

/// Virtual simulation clock in whole milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    current_ms: u64,
    /// Last tick the simulation is allowed to reach.
    ceiling_ms: u64,
}

impl SimClock {
    /// Create a clock at tick zero that may advance up to `ceiling_ms`.
    pub fn new(ceiling_ms: u64) -> Self {
        Self {
            current_ms: 0,
            ceiling_ms,
        }
    }

    /// Current tick.
    pub fn now_ms(&self) -> u64 {
        self.current_ms
    }

    /// Configured ceiling.
    pub fn ceiling_ms(&self) -> u64 {
        self.ceiling_ms
    }

    /// Whether `ms` lies beyond the ceiling.
    pub fn exceeds_ceiling(&self, ms: u64) -> bool {
        ms > self.ceiling_ms
    }

    /// Jump to tick `ms`.
    ///
    /// Returns `false` and leaves the clock untouched when `ms` is past the
    /// ceiling.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `ms` is in the past.
    pub fn advance_to_ms(&mut self, ms: u64) -> bool {
        debug_assert!(
            ms >= self.current_ms,
            "Cannot move clock backwards: current={}ms, target={}ms",
            self.current_ms,
            ms,
        );
        if self.exceeds_ceiling(ms) {
            return false;
        }
        self.current_ms = ms;
        true
    }
}
